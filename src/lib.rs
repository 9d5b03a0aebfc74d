pub mod common;
pub mod configs;
pub mod onesie;
