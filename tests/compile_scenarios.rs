//! End-to-end compile scenarios: notebook in, step graph and script out

mod helpers;
mod scenarios;
