//! Editor config and neural setup wizard tests

mod editor_tests;
mod wizard_tests;
