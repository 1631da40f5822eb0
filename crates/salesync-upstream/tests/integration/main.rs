//! Integration tests for salesync-upstream
//!
//! Uses wiremock to simulate the token endpoint and the list API and
//! verifies token caching, the retry policy, and page classification.

mod common;

mod test_pages;
mod test_retry;
mod test_token;
