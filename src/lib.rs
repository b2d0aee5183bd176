#![allow(non_camel_case_types)]

pub mod global;
pub mod symbolic;
pub mod transform;
pub mod utils;
