#![allow(dead_code, unused_imports)]
pub mod fuzz_tester;
pub mod mock_clock;
pub mod test_db;

pub use fuzz_tester::*;
pub use mock_clock::*;
pub use test_db::*;
