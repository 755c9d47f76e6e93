mod common;

mod app_tests;
mod query_tests;
mod responder_tests;
mod script_tests;
