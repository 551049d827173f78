use domain_upstreams::upstream::{
    complies, Caps, Error, Parent, Transport, UpstreamId, UpstreamIter,
    Upstreams,
};
use rstest::rstest;

fn init() {
    #[cfg(feature = "logging")]
    domain_upstreams::logging::init_logging();
}

/// Builds the forest of a group A with a single child group B.
fn nested() -> (Upstreams<()>, UpstreamId, UpstreamId) {
    let mut upstreams = Upstreams::new(());
    let a = upstreams
        .append_group(Parent::Root, "a", Caps::ENCRYPTED | Caps::STATEFUL)
        .unwrap();
    let b = upstreams
        .append_group(
            a,
            "b",
            Caps::ENCRYPTED | Caps::STATEFUL | Caps::AUTHENTICATED,
        )
        .unwrap();
    (upstreams, a, b)
}

#[rstest]
#[case(Caps::NONE, Some("a"))]
#[case(Caps::ENCRYPTED, Some("a"))]
#[case(Caps::ENCRYPTED | Caps::AUTHENTICATED, Some("b"))]
#[case(Caps::AUTHENTICATED, Some("b"))]
#[case(Caps::PADDING, None)]
#[case(Caps::MIGHT, None)]
fn nested_selection(#[case] cap: Caps, #[case] expected: Option<&str>) {
    init();
    let (mut upstreams, a, b) = nested();
    let expected = expected.map(|name| if name == "a" { a } else { b });
    let mut iter = UpstreamIter::new(&upstreams, cap);
    assert_eq!(iter.next(&upstreams), expected);
    assert_eq!(upstreams.select(cap), expected);
}

#[test]
fn nested_iteration_skips_non_complying() {
    let (upstreams, a, b) = nested();
    assert_eq!(
        upstreams.iter(Caps::ENCRYPTED).collect::<Vec<_>>(),
        [a, b]
    );
    assert_eq!(
        upstreams.iter(Caps::AUTHENTICATED).collect::<Vec<_>>(),
        [b]
    );
    assert_eq!(upstreams.iter(Caps::PADDING).count(), 0);
}

#[test]
fn endpoints_keep_insertion_order() {
    init();
    let mut upstreams = Upstreams::new(());
    let server = upstreams
        .append_group(Parent::Root, "server", Caps::NONE)
        .unwrap();
    let appended = (1..=20)
        .map(|i| {
            upstreams
                .append_endpoint(
                    server,
                    &format!("192.0.2.{}", i),
                    Transport::Udp,
                )
                .unwrap()
        })
        .collect::<Vec<_>>();

    assert_eq!(upstreams.children(server).collect::<Vec<_>>(), appended);
    let visited = upstreams.iter(Caps::NONE).collect::<Vec<_>>();
    assert_eq!(visited[0], server);
    assert_eq!(visited[1..], appended);
}

#[test]
fn malformed_endpoint_is_rejected() {
    let mut upstreams = Upstreams::new(());
    let server = upstreams
        .append_group(Parent::Root, "server", Caps::NONE)
        .unwrap();
    upstreams
        .append_endpoint(server, "192.0.2.1", Transport::Udp)
        .unwrap();
    for addr in ["192.0.2", "dns.example", "192.0.2.1@53x", "[2001:db8::1"] {
        let err = upstreams
            .append_endpoint(server, addr, Transport::Udp)
            .unwrap_err();
        assert!(matches!(err, Error::AddressFormat(_)), "{}", addr);
    }
    assert_eq!(upstreams.children(server).count(), 1);
    assert_eq!(upstreams.len(), 2);
}

#[test]
fn unsatisfiable_terminates() {
    let mut upstreams = Upstreams::new(());
    let only = upstreams
        .append_endpoint(Parent::Root, "192.0.2.1", Transport::Tcp)
        .unwrap();
    let mut iter = UpstreamIter::after(only, Caps::ENCRYPTED, Some(only));
    assert_eq!(iter.next(&upstreams), None);
    assert_eq!(upstreams.select(Caps::ENCRYPTED), None);
    assert_eq!(upstreams.fail_over(Caps::ENCRYPTED), None);
}

#[test]
fn selection_resumes_from_cache() {
    init();
    let mut upstreams = Upstreams::new(());
    let servers = ["192.0.2.1", "192.0.2.2", "192.0.2.3"].map(|addr| {
        upstreams
            .append_server(
                Parent::Root,
                addr,
                addr,
                &[Transport::Udp, Transport::Tcp],
            )
            .unwrap()
    });
    let tcp = |upstreams: &Upstreams<()>, server: UpstreamId| {
        upstreams.children(server).nth(1).unwrap()
    };

    // Stateful queries go to the first TCP endpoint, and stay there.
    let stateful = Caps::STATEFUL | Caps::KEEPALIVE;
    let first = upstreams.select(stateful).unwrap();
    assert_eq!(first, servers[0]);
    let first = upstreams.fail_over(stateful).unwrap();
    assert_eq!(first, tcp(&upstreams, servers[0]));
    assert_eq!(upstreams.select(stateful), Some(first));

    // Failing over moves on to the next server.
    let second = upstreams.fail_over(stateful).unwrap();
    assert_eq!(second, servers[1]);
    assert_eq!(upstreams.select(stateful), Some(second));

    // Once the cached server goes away, selection starts over.
    upstreams.release(servers[1]);
    assert_eq!(upstreams.current(stateful), None);
    assert_eq!(upstreams.select(stateful), Some(servers[0]));
}

#[test]
fn capabilities_follow_may() {
    let mut upstreams = Upstreams::new(());
    let tls = upstreams
        .append_endpoint(
            Parent::Root,
            "192.0.2.1~dns.example",
            Transport::Tls,
        )
        .unwrap();

    let upstream = upstreams.get_mut(tls).unwrap();
    assert_eq!(upstream.can(), Caps::NONE);
    upstream.confirm(Caps::TRANSPORT | Caps::EDNS0 | Caps::DNSSEC_SIGS);
    upstream.confirm(Caps::from_bits(0xFFFF));
    let ceiling = upstream.may() | Caps::DNSSEC_OBSERVATIONS;
    assert!(complies(upstream.can(), ceiling));
    assert!(complies(Caps::TRANSPORT, upstream.can()));

    upstream.set_may(Caps::STATEFUL | Caps::ENCRYPTED);
    assert!(!upstream.can().contains(Caps::AUTHENTICATED));
    assert!(upstream.can().contains(Caps::DNSSEC_SIGS));
    assert_eq!(
        upstreams.select(Caps::STATEFUL | Caps::AUTHENTICATED),
        None
    );
}
