//! Daily email digest of yesterday's articles from an OPML list of RSS/Atom feeds.

pub mod app;
pub mod config;
pub mod digest;
pub mod feed;
pub mod mail;
pub mod util;
