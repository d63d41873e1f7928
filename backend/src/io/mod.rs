//! # IO Module
//!
//! HTTP interface over the domain services. Handlers translate requests
//! into service calls and domain errors into status codes; they carry no
//! business rules of their own.

pub mod rest;
