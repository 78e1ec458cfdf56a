pub mod fhe;
pub mod signatures;
