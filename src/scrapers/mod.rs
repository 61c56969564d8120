//! Page-level extraction.
//!
//! | Component | Module | Input | Output |
//! |-----------|--------|-------|--------|
//! | Inbox Scraper | [`inbox`] | logged-in page, limit | [`InboxScrape`](crate::models::InboxScrape) |
//! | Content Fetcher | [`article`] | page, article URL | [`ArticleContent`](crate::models::ArticleContent) |
//!
//! Both take a `&dyn Page` and leave browser lifetime to the caller.

pub mod article;
pub mod inbox;
