//! Integration tests for daybook-drive
//!
//! Uses wiremock to simulate the token endpoint and the file API and
//! verifies authentication, listing, uploads, downloads and sign-in.

mod common;

mod test_authenticator;
mod test_files;
mod test_profile;
