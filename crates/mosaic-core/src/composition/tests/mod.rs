pub mod fixtures;
pub mod set_tests;
