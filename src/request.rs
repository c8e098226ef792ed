//! The context a network filter is matched against.

use crate::filters::network::TypeMask;

/// A request seen from the document that issued it. The URL is matched by
/// the filter pattern; the remaining fields drive the option checks.
#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub url: &'a str,
    pub content_type: TypeMask,
    pub doc_domain: &'a str,
    pub third_party: bool,
    pub sitekey: &'a str,
}

impl<'a> Request<'a> {
    pub fn new(url: &'a str, doc_domain: &'a str, content_type: TypeMask) -> Self {
        Request {
            url,
            content_type,
            doc_domain,
            third_party: false,
            sitekey: "",
        }
    }

    pub fn third_party(mut self, third_party: bool) -> Self {
        self.third_party = third_party;
        self
    }

    pub fn sitekey(mut self, sitekey: &'a str) -> Self {
        self.sitekey = sitekey;
        self
    }
}
