pub mod pattern;
pub mod raster;
