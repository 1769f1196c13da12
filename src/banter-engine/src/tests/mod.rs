//! Comprehensive tests for banter-engine modules.

mod session_tests;
