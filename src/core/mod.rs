pub mod burst;
pub mod clustering;
pub mod descriptor;
pub mod scoring;
pub mod selection;
