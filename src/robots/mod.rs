//! Robots.txt politeness
//!
//! The crawler consults [`RobotsCache`] before visiting a URL when
//! `respect_robots` is set, and feeds Crawl-delay values to the scheduler.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::RobotsPolicy;
