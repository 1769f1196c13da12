//! Comprehensive tests for banter-protocol
