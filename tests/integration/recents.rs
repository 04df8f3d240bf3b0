//! Recently used plugins per host

use crate::helpers::*;
use rackd::prelude::*;

fn server_with(names: &[&str], max: usize) -> (RackServer, Vec<String>) {
    let specs: Vec<_> = names.iter().map(|n| TestPluginSpec::new(n)).collect();
    let ids = specs.iter().map(TestPluginSpec::id).collect();
    init_logging();
    let server = RackServer::builder()
        .registry(test_registry(&specs))
        .max_recents(max)
        .build()
        .unwrap();
    (server, ids)
}

#[test]
fn test_recents_are_capped_and_ordered() {
    let (server, ids) = server_with(&["A", "B", "C"], 2);
    let (worker, _client) = start_session(&server, stereo_session(), &[]);

    for id in &ids {
        assert!(worker.add_to_recents(id, "daw-1"));
    }
    assert_eq!(server.recents("daw-1"), vec![ids[2].clone(), ids[1].clone()]);

    assert!(worker.add_to_recents(&ids[1], "daw-1"));
    assert_eq!(server.recents("daw-1"), vec![ids[1].clone(), ids[2].clone()]);
}

#[test]
fn test_recents_are_per_host_and_shared_across_sessions() {
    let (server, ids) = server_with(&["A", "B"], 5);
    let (first, _c1) = start_session(&server, stereo_session(), &[]);
    let (second, _c2) = start_session(&server, stereo_session(), &[]);

    first.add_to_recents(&ids[0], "daw-1");
    second.add_to_recents(&ids[1], "daw-2");
    assert_eq!(second.recents_list("daw-1"), vec![ids[0].clone()]);
    assert_eq!(first.recents_list("daw-2"), vec![ids[1].clone()]);
    assert!(first.recents_list("daw-3").is_empty());
}

#[test]
fn test_recents_store_canonical_ids() {
    let (server, ids) = server_with(&["Reverb"], 5);
    let (worker, _client) = start_session(&server, stereo_session(), &[]);

    assert!(!worker.add_to_recents("VST3-Unknown-2a", "daw"));
    assert!(worker.recents_list("daw").is_empty());

    assert!(worker.add_to_recents("VST3-Reverb-9f3a-2a", "daw"));
    assert!(worker.add_to_recents("/plugins/Reverb.vst3", "daw"));
    assert_eq!(worker.recents_list("daw"), vec![ids[0].clone()]);
}
