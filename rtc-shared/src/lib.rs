#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod error;
pub(crate) mod tagged;
pub mod time;

pub use tagged::Tagged;
