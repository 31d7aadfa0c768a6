mod support;

use std::fs;

use gradeit::{FeedbackDocument, FeedbackStore};
use support::temp_root;

fn report(username: &str, body: &str) -> String {
    format!("# Grading Report: {username}\n**Group**: {username}-2026-winter-cis-271-01\n---\n{body}\n")
}

#[test]
fn append_creates_directory_and_separates_entries() {
    let root = temp_root("fb-append");
    let out = root.join("nested").join("feedback");
    let mut store = FeedbackStore::new(&out);

    let path = store.append("lab1", &report("alice", "A")).expect("append alice");
    store.append("lab1", &report("bob", "B")).expect("append bob");

    assert_eq!(path, out.join("lab1_Feedback.md"));
    let text = fs::read_to_string(&path).expect("read");
    assert_eq!(text, format!("{}\n{}\n", report("alice", "A"), report("bob", "B")));

    let entries = store.read("lab1").expect("read entries");
    let names: Vec<_> = entries.iter().map(|e| e.username()).collect();
    assert_eq!(names, ["alice", "bob"]);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn append_starts_a_new_line_after_unterminated_text() {
    let root = temp_root("fb-newline");
    let path = root.join("lab1_Feedback.md");
    fs::write(&path, "# Grading Report: alice\nA").expect("seed");

    let mut store = FeedbackStore::new(&root);
    store.append("lab1", &report("bob", "B")).expect("append");

    let text = fs::read_to_string(&path).expect("read");
    assert!(text.starts_with("# Grading Report: alice\nA\n# Grading Report: bob\n"));
    assert_eq!(store.read("lab1").expect("entries").len(), 2);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn replace_preserves_siblings_byte_for_byte() {
    let root = temp_root("fb-replace");
    let path = root.join("lab1_Feedback.md");
    let original = "Course feedback, winter term\n\n\
                    # Grading Report: alice\nalice body\n\n\
                    # Grading Report: bob\nHomework not Completed. Repository not found\n\n\n\
                    # Grading Report: carol\r\ncarol body\r\n";
    fs::write(&path, original).expect("seed");

    let mut store = FeedbackStore::new(&root);
    let before = store.document("lab1").expect("document");
    assert_eq!(before.serialize(), original);
    assert!(FeedbackStore::is_missing_repo_entry(&before.entries()[1]));

    store
        .replace("lab1", "bob", &report("bob", "graded at last"))
        .expect("replace");

    let after = store.document("lab1").expect("document");
    let names: Vec<_> = after.entries().iter().map(|e| e.username()).collect();
    assert_eq!(names, ["alice", "bob", "carol"]);
    assert_eq!(after.preamble(), before.preamble());
    assert_eq!(after.entries()[0], before.entries()[0]);
    assert_eq!(after.entries()[2], before.entries()[2]);
    assert_eq!(after.entries()[1].raw_content(), format!("{}\n", report("bob", "graded at last")));
    assert!(!FeedbackStore::is_missing_repo_entry(&after.entries()[1]));

    let leftovers: Vec<_> = fs::read_dir(&root)
        .expect("list")
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(leftovers, ["lab1_Feedback.md"]);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn replace_without_file_appends() {
    let root = temp_root("fb-replace-new");
    let mut store = FeedbackStore::new(&root);

    let path = store
        .replace("lab1", "amir", &report("amir", "fresh"))
        .expect("replace");

    assert_eq!(fs::read_to_string(path).expect("read"), format!("{}\n", report("amir", "fresh")));
    let _ = fs::remove_dir_all(root);
}

#[test]
fn replace_of_unknown_student_appends_with_separator() {
    let root = temp_root("fb-replace-unknown");
    let path = root.join("lab1_Feedback.md");
    fs::write(&path, "# Grading Report: alice\nalice body").expect("seed");

    let mut store = FeedbackStore::new(&root);
    store
        .replace("lab1", "bob", &report("bob", "B"))
        .expect("replace");

    let text = fs::read_to_string(&path).expect("read");
    assert_eq!(text, format!("# Grading Report: alice\nalice body\n\n{}\n", report("bob", "B")));
    let _ = fs::remove_dir_all(root);
}

#[test]
fn unrelated_file_gets_a_versioned_sibling() {
    let root = temp_root("fb-version");
    fs::write(root.join("lab1_Feedback.md"), "# Old Run\nhand-written notes\n").expect("seed");

    let mut store = FeedbackStore::new(&root);
    let path = store.resolve_path("lab1").expect("resolve");
    assert_eq!(path, root.join("lab1_Feedback_1.md"));

    store.append("lab1", &report("amir", "A")).expect("append");
    assert_eq!(
        fs::read_to_string(root.join("lab1_Feedback.md")).expect("read"),
        "# Old Run\nhand-written notes\n"
    );

    // A later run reuses the versioned document rather than creating _2.
    let mut next = FeedbackStore::new(&root);
    assert_eq!(next.resolve_path("lab1").expect("resolve"), root.join("lab1_Feedback_1.md"));
    assert_eq!(next.read("lab1").expect("entries").len(), 1);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn binary_file_gets_a_versioned_sibling() {
    let root = temp_root("fb-binary");
    let seeded: &[u8] = b"\xff\xfe legacy notes\n";
    fs::write(root.join("lab1_Feedback.md"), seeded).expect("seed");

    let mut store = FeedbackStore::new(&root);
    assert_eq!(store.resolve_path("lab1").expect("resolve"), root.join("lab1_Feedback_1.md"));
    assert!(store.read("lab1").expect("entries").is_empty());

    store.append("lab1", &report("amir", "A")).expect("append");
    assert_eq!(store.read("lab1").expect("entries").len(), 1);
    assert_eq!(fs::read(root.join("lab1_Feedback.md")).expect("read"), seeded);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn empty_or_managed_files_are_used_directly() {
    let root = temp_root("fb-managed");
    fs::write(root.join("lab1_Feedback.md"), "").expect("seed empty");
    fs::write(root.join("lab2_Feedback.md"), report("alice", "A")).expect("seed managed");

    let mut store = FeedbackStore::new(&root);
    assert_eq!(store.resolve_path("lab1").expect("resolve"), root.join("lab1_Feedback.md"));
    assert_eq!(store.resolve_path("lab2").expect("resolve"), root.join("lab2_Feedback.md"));
    assert!(store.read("lab1").expect("entries").is_empty());
    assert!(store.read("lab3").expect("entries").is_empty());

    let _ = fs::remove_dir_all(root);
}

#[test]
fn resolved_path_is_memoized_for_the_store() {
    let root = temp_root("fb-memo");
    let mut store = FeedbackStore::new(&root);
    let first = store.resolve_path("lab1").expect("resolve");

    // Content appearing mid-run does not move the document.
    fs::write(&first, "unrelated\n").expect("seed");
    assert_eq!(store.resolve_path("lab1").expect("resolve"), first);

    let _ = fs::remove_dir_all(root);
}

#[test]
fn duplicated_headers_round_trip() {
    let text = "# Grading Report: amir\none\n\n# Grading Report: amir\ntwo\n";
    let doc = FeedbackDocument::parse(text);
    assert_eq!(doc.entries().len(), 2);
    assert_eq!(doc.position("amir"), Some(0));
    assert_eq!(doc.serialize(), text);
}
