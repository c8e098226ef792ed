//! Core of a content-blocking engine: the filter-list domain model, the
//! rule parser, active-filter matching and the subscription layer.
//!
//! Rule texts enter through [`Filter::from_text`], which classifies each
//! line and deduplicates instances process-wide. Subscriptions hold ordered
//! lists of those shared filters; [`storage::FilterStorage`] owns the
//! subscriptions, and [`elem_hide::ElemHide`] answers per-host selector
//! queries. Network matching delegates pattern compilation to a
//! [`pattern::PatternMatcher`], by default backed by the `regex` crate.
//!
//! Everything here is synchronous and runs to completion; concurrent
//! callers must serialize access externally.

pub mod elem_hide;
pub mod filters;
pub mod notifier;
pub mod pattern;
pub mod request;
pub mod scanner;
pub mod storage;
pub mod subscriptions;

pub use crate::elem_hide::{ElemHide, ElemHideEmulation};
pub use crate::filters::network::TypeMask;
pub use crate::filters::{Filter, FilterKind, FilterRef, InvalidReason};
pub use crate::notifier::{FilterListener, Topic};
pub use crate::pattern::{PatternMatcher, RegexEngine};
pub use crate::request::Request;
pub use crate::storage::FilterStorage;
pub use crate::subscriptions::parser::ListParser;
pub use crate::subscriptions::Subscription;
