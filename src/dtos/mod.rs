pub mod coupondtos;
pub mod loyaltydtos;
pub mod referraldtos;
