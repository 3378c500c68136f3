//! Integration tests

mod backtest_test;
mod persistence_test;
mod visibility_test;
