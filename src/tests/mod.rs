pub mod mattern_tests;
pub mod process_tests;
