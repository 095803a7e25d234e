mod fit;
mod model;
mod registry;
mod solver;
