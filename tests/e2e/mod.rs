//! End-to-end tests against throwaway repositories

mod analysis;
mod cli;
mod index;
mod queries;
