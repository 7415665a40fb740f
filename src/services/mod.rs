//! Service layer for the monitor application.
//!
//! This module contains the outbound networking building blocks:
//! - Proxy rotation (`ProxyPool`)
//! - Resilient fetching (`HttpSession`, `RequestClient`)

mod fetch;
mod proxy;

pub use fetch::{FetchOptions, HttpSession, RequestClient};
pub use proxy::ProxyPool;
