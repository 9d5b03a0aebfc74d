pub mod onesie;

pub use onesie::*;
