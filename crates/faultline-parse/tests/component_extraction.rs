use faultline_core::{CommitContent, Component, FileChange, Language, overlap};
use faultline_parse::{ComponentExtractor, Snapshot};

const REQUEST_HANDLER: &str = r#"
function handleRequest(req: string): void {
  validate(req);
  log(req);
}

function validate(req: string): boolean {
  return checkLength(req);
}

function checkLength(req: string): boolean {
  return req.length < 1024;
}

function log(msg: string): string {
  return msg;
}
"#;

const HEARTBEAT_BEFORE: &str = r#"
struct record {
    unsigned int length;
    unsigned char *data;
};

static int read_u16(const unsigned char *p) {
    return (p[0] << 8) | p[1];
}

int process_heartbeat(struct record *rec, unsigned char *out) {
    int payload = read_u16(rec->data);
    memcpy(out, rec->data + 3, payload);
    return 0;
}

int dispatch(struct record *rec, unsigned char *out) {
    return process_heartbeat(rec, out);
}

int unrelated_stats(void) {
    return 42;
}
"#;

const HEARTBEAT_AFTER: &str = r#"
struct record {
    unsigned int length;
    unsigned char *data;
};

static int read_u16(const unsigned char *p) {
    return (p[0] << 8) | p[1];
}

int process_heartbeat(struct record *rec, unsigned char *out) {
    int payload = read_u16(rec->data);
    if (1 + 2 + payload + 16 > rec->length)
        return 0;
    memcpy(out, rec->data + 3, payload);
    return 0;
}

int dispatch(struct record *rec, unsigned char *out) {
    return process_heartbeat(rec, out);
}

int unrelated_stats(void) {
    return 42;
}
"#;

fn extractor() -> ComponentExtractor {
    ComponentExtractor::new().expect("component extractor")
}

fn members(component: &Component) -> Vec<&str> {
    component.iter().collect()
}

fn roots(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

#[test]
fn handle_request_one_hop_contains_direct_callees_only() {
    let snapshot = Snapshot::new("src/server.ts", Language::TypeScript, REQUEST_HANDLER);
    let component = extractor()
        .extract_component(snapshot, &roots(&["handleRequest"]), 1)
        .expect("component");

    assert_eq!(members(&component), vec!["handleRequest", "log", "validate"]);
}

#[test]
fn handle_request_two_hops_reach_transitive_callee() {
    let snapshot = Snapshot::new("src/server.ts", Language::TypeScript, REQUEST_HANDLER);
    let component = extractor()
        .extract_component(snapshot, &roots(&["handleRequest"]), 2)
        .expect("component");

    assert_eq!(
        members(&component),
        vec!["checkLength", "handleRequest", "log", "validate"]
    );
}

#[test]
fn extraction_is_deterministic_across_runs_and_root_order() {
    let snapshot = Snapshot::new("ssl/d1_both.c", Language::C, HEARTBEAT_AFTER);
    let first = extractor()
        .extract_component(snapshot, &roots(&["process_heartbeat", "dispatch"]), 2)
        .expect("first");
    let second = extractor()
        .extract_component(snapshot, &roots(&["dispatch", "process_heartbeat"]), 2)
        .expect("second");

    assert_eq!(first, second);
    assert_eq!(members(&first), members(&second));
}

#[test]
fn components_grow_monotonically_with_k() {
    let snapshot = Snapshot::new("ssl/d1_both.c", Language::C, HEARTBEAT_AFTER);
    let extractor = extractor();
    let mut previous = Component::empty();
    for k in 0..=4 {
        let current = extractor
            .extract_component(snapshot, &roots(&["read_u16"]), k)
            .expect("component");
        assert!(
            previous.iter().all(|symbol| current.contains(symbol)),
            "k={k} dropped members of the k-1 component"
        );
        previous = current;
    }
    assert!(previous.contains("dispatch"));
    assert!(!previous.contains("unrelated_stats"));
}

#[test]
fn empty_roots_yield_empty_component() {
    let snapshot = Snapshot::new("src/server.ts", Language::TypeScript, REQUEST_HANDLER);
    let component = extractor()
        .extract_component(snapshot, &[], 3)
        .expect("component");
    assert!(component.is_empty());
}

#[test]
fn change_component_is_rooted_at_modified_function() {
    let component = extractor()
        .change_component(
            HEARTBEAT_BEFORE,
            HEARTBEAT_AFTER,
            Language::C,
            "ssl/d1_both.c",
            1,
        )
        .expect("change component");

    assert!(component.contains("process_heartbeat"));
    assert!(component.contains("read_u16"));
    assert!(component.contains("dispatch"));
    assert!(component.contains("memcpy"));
    assert!(!component.contains("unrelated_stats"));
}

#[test]
fn whitespace_only_change_has_no_component() {
    let reformatted = HEARTBEAT_BEFORE.replace("    return 42;", "        return 42;");
    let component = extractor()
        .change_component(
            HEARTBEAT_BEFORE,
            &reformatted,
            Language::C,
            "ssl/d1_both.c",
            3,
        )
        .expect("change component");
    assert!(component.is_empty());
}

#[test]
fn commit_component_unions_files_and_skips_unknown_languages() {
    let content = CommitContent {
        commit_id: "abc123".to_owned(),
        files: vec![
            FileChange {
                path: "ssl/d1_both.c".to_owned(),
                language: Some(Language::C),
                before: HEARTBEAT_BEFORE.to_owned(),
                after: HEARTBEAT_AFTER.to_owned(),
            },
            FileChange {
                path: "src/server.ts".to_owned(),
                language: None,
                before: String::new(),
                after: REQUEST_HANDLER.to_owned(),
            },
            FileChange {
                path: "CHANGES.md".to_owned(),
                language: None,
                before: "old".to_owned(),
                after: "new".to_owned(),
            },
        ],
    };

    let component = extractor()
        .commit_component(&content, 1)
        .expect("commit component");
    assert!(component.contains("process_heartbeat"));
    assert!(component.contains("handleRequest"));
    assert!(component.contains("checkLength"));
}

#[test]
fn related_changes_overlap_more_than_unrelated_ones() {
    let extractor = extractor();
    let fix = extractor
        .change_component(
            HEARTBEAT_BEFORE,
            HEARTBEAT_AFTER,
            Language::C,
            "ssl/d1_both.c",
            2,
        )
        .expect("fix component");

    let touched_dispatch = HEARTBEAT_BEFORE.replace(
        "return process_heartbeat(rec, out);",
        "if (rec == 0) return -1;\n    return process_heartbeat(rec, out);",
    );
    let related = extractor
        .change_component(
            HEARTBEAT_BEFORE,
            &touched_dispatch,
            Language::C,
            "ssl/d1_both.c",
            2,
        )
        .expect("related component");

    let touched_stats = HEARTBEAT_BEFORE.replace("return 42;", "return 43;");
    let unrelated = extractor
        .change_component(
            HEARTBEAT_BEFORE,
            &touched_stats,
            Language::C,
            "ssl/d1_both.c",
            2,
        )
        .expect("unrelated component");

    assert!(overlap(&fix, &related) >= 0.10);
    assert_eq!(overlap(&fix, &unrelated), 0.0);
}
