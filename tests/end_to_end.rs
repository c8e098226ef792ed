//! Exercises the full pipeline: download body in, parsed subscription and
//! matching decisions out.

use adblock_core::{
    ElemHide, Filter, FilterStorage, ListParser, RegexEngine, Request, Subscription, TypeMask,
};

const LIST_BODY: &str = "[Adblock Plus 2.0]\n\
                         ! Title: Test List\n\
                         ! Expires: 1 day\n\
                         ! Homepage: https://example.org\n\
                         ||ads.example.com^\n\
                         @@||ads.example.com/acceptable^$image\n\
                         example.com,~good.example.com##.banner\n\
                         example.com#@#.sponsored\n\
                         ##.sponsored\n";

#[test]
fn download_to_matching_decisions() {
    let mut parser = ListParser::new();
    assert!(parser.process(LIST_BODY));
    assert!(parser.error().is_none());
    assert_eq!(parser.homepage(), "https://example.org");

    let mut subscription = Subscription::from_id("https://e2e.example/list.txt");
    let expires = parser.finalize(&mut subscription);
    assert_eq!(expires, 86_400_000);
    assert_eq!(subscription.title(), "Test List");
    assert!(subscription.fixed_title());
    assert_eq!(subscription.filter_count(), 5);

    // Network decisions.
    let engine = RegexEngine;
    let blocking = subscription.filter_at(0).unwrap();
    assert!(blocking.matches(
        &Request::new("http://ads.example.com/banner.gif", "example.com", TypeMask::IMAGE),
        &engine
    ));
    assert!(!blocking.matches(
        &Request::new("http://example.com/banner.gif", "example.com", TypeMask::IMAGE),
        &engine
    ));
    let whitelist = subscription.filter_at(1).unwrap();
    assert_eq!(whitelist.filter_type(), "whitelist");
    assert!(whitelist.matches(
        &Request::new(
            "http://ads.example.com/acceptable/img.png",
            "example.com",
            TypeMask::IMAGE
        ),
        &engine
    ));

    // Element-hiding decisions.
    let mut elem_hide = ElemHide::new();
    for filter in subscription.filters() {
        elem_hide.add(filter);
    }
    let on_example: Vec<String> = elem_hide
        .selectors_for_domain("example.com")
        .into_iter()
        .map(|(selector, _)| selector)
        .collect();
    assert_eq!(on_example, vec![".banner"]);

    // The exception only covers example.com; elsewhere the generic rule
    // still hides sponsored content, and the scoped one does not apply.
    let elsewhere: Vec<String> = elem_hide
        .selectors_for_domain("other.example")
        .into_iter()
        .map(|(selector, _)| selector)
        .collect();
    assert_eq!(elsewhere, vec![".sponsored"]);

    // The excluded subdomain sees neither the scoped banner rule nor the
    // masked sponsored rule.
    let on_good: Vec<String> = elem_hide
        .selectors_for_domain("good.example.com")
        .into_iter()
        .map(|(selector, _)| selector)
        .collect();
    assert!(on_good.is_empty());

    // Storage resolves shared filters to their earliest subscription.
    let mut storage = FilterStorage::new();
    storage.add_subscription(subscription);
    let shared = Filter::from_text("||ads.example.com^").unwrap();
    assert_eq!(
        storage.subscription_for_filter(&shared).unwrap().id(),
        "https://e2e.example/list.txt"
    );
}

#[test]
fn invalid_header_is_reported() {
    let mut parser = ListParser::new();
    assert!(!parser.process("some garbage\n||ads.example.com^\n"));
    assert_eq!(parser.error(), Some("synchronize_invalid_data"));
}

#[test]
fn serialized_state_survives_a_roundtrip() {
    let filter = Filter::from_text("||roundtrip.example^$script").unwrap();
    filter.set_hit_count(3);
    filter.set_last_hit(1_600_000_000_000);

    let serialized = filter.serialize();
    let mut lines = serialized.lines();
    assert_eq!(lines.next(), Some("[Filter]"));
    assert_eq!(lines.next(), Some("text=||roundtrip.example^$script"));
    assert_eq!(lines.next(), Some("hitCount=3"));
    assert_eq!(lines.next(), Some("lastHit=1600000000000"));
    assert_eq!(lines.next(), None);

    // Feeding the text back yields the very same instance.
    let reparsed = Filter::from_text("||roundtrip.example^$script").unwrap();
    assert_eq!(reparsed.hit_count(), 3);
}
