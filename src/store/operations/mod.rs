pub mod calibration;
pub mod media;
