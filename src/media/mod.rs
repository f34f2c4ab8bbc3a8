pub mod audio;

#[cfg(feature = "tch-backend")]
pub mod image;
