//! End-to-end tests for the Concord HTTP boundary live under `tests/`
