mod common;

use common::{commit_and_wait, search, search_string, small_config, title_index};
use memindex::query::{FieldSpec, RequestContext, TermFieldMatchData, TermNode};
use memindex::{CollectionType, DataType, DataValue, Document, MemoryIndex, Schema};

#[test]
fn test_end_to_end_scenario() -> memindex::Result<()> {
    let index = title_index()?;

    // 1. Two documents, one commit
    index.insert_document(1, Document::new().add_text("title", "red shoes"));
    index.insert_document(2, Document::new().add_text("title", "blue shoes"));
    commit_and_wait(&index)?;

    assert_eq!(search_string(&index, "title", "shoes"), vec![1, 2]);
    assert_eq!(search_string(&index, "title", "red"), vec![1]);

    // 2. Remove one of them
    index.remove_document(1);
    commit_and_wait(&index)?;

    assert!(search_string(&index, "title", "red").is_empty());
    assert_eq!(search_string(&index, "title", "shoes"), vec![2]);
    assert_eq!(index.num_docs(), 1);
    Ok(())
}

#[test]
fn test_insert_is_invisible_until_commit() -> memindex::Result<()> {
    let index = title_index()?;
    index.insert_document(1, Document::new().add_text("title", "red shoes"));

    // Inversion may have finished, but nothing is pushed yet.
    index.sync()?;
    assert!(search_string(&index, "title", "red").is_empty());
    assert!(index.transient_memory_usage() > 0);

    commit_and_wait(&index)?;
    assert_eq!(search_string(&index, "title", "red"), vec![1]);
    assert_eq!(index.transient_memory_usage(), 0);
    Ok(())
}

#[test]
fn test_remove_of_committed_document() -> memindex::Result<()> {
    let index = title_index()?;
    index.insert_document(4, Document::new().add_text("title", "green hat"));
    commit_and_wait(&index)?;

    index.remove_document(4);
    // Still visible until the remove is committed.
    assert_eq!(search_string(&index, "title", "hat"), vec![4]);
    commit_and_wait(&index)?;

    assert!(search_string(&index, "title", "hat").is_empty());
    assert!(search_string(&index, "title", "green").is_empty());
    assert_eq!(index.num_words(), 0);
    Ok(())
}

#[test]
fn test_reinsert_counts_once() -> memindex::Result<()> {
    let index = title_index()?;
    index.insert_document(3, Document::new().add_text("title", "red"));
    index.insert_document(3, Document::new().add_text("title", "blue"));
    assert_eq!(index.num_docs(), 1);

    commit_and_wait(&index)?;
    assert_eq!(index.num_docs(), 1);
    // The later insert wins.
    assert!(search_string(&index, "title", "red").is_empty());
    assert_eq!(search_string(&index, "title", "blue"), vec![3]);

    // Removing an unknown document does not change the count.
    index.remove_document(99);
    assert_eq!(index.num_docs(), 1);
    Ok(())
}

#[test]
fn test_freeze_rejects_mutation() -> memindex::Result<()> {
    let index = title_index()?;
    index.insert_document(1, Document::new().add_text("title", "red shoes"));
    commit_and_wait(&index)?;

    index.freeze();
    index.freeze();
    assert!(index.is_frozen());

    index.insert_document(2, Document::new().add_text("title", "red hat"));
    index.remove_document(1);
    commit_and_wait(&index)?;

    assert_eq!(index.num_docs(), 1);
    assert_eq!(search_string(&index, "title", "red"), vec![1]);
    assert!(search_string(&index, "title", "hat").is_empty());
    Ok(())
}

#[test]
fn test_numeric_and_keyword_fields() -> memindex::Result<()> {
    let schema = Schema::builder()
        .add_text_field("title")
        .add_field("year", DataType::Int64)
        .add_field("price", DataType::Float64)
        .add_field("in_stock", DataType::Bool)
        .build();
    let index = MemoryIndex::builder(schema).config(small_config()).build()?;

    index.insert_document(
        1,
        Document::new()
            .add_keyword("title", "Red Shoes")
            .add_integer("year", 2024)
            .add_float("price", 20.0)
            .add_boolean("in_stock", true),
    );
    index.insert_document(2, Document::new().add_float("price", 19.5));
    commit_and_wait(&index)?;

    // Keywords are one exact term.
    assert_eq!(search_string(&index, "title", "red shoes"), vec![1]);
    assert!(search_string(&index, "title", "red").is_empty());

    assert_eq!(search(&index, "year", TermNode::Number("2024".into())), vec![1]);
    assert_eq!(search(&index, "price", TermNode::Number("20".into())), vec![1]);
    assert_eq!(search(&index, "price", TermNode::Number("19.50".into())), vec![2]);
    assert_eq!(search_string(&index, "in_stock", "TRUE"), vec![1]);
    Ok(())
}

#[test]
fn test_number_terms_in_text_fields() -> memindex::Result<()> {
    let index = title_index()?;
    index.insert_document(1, Document::new().add_text("title", "size 42.0 and 007 agent"));
    commit_and_wait(&index)?;

    assert_eq!(search(&index, "title", TermNode::Number("42.0".into())), vec![1]);
    assert_eq!(search(&index, "title", TermNode::Number("007".into())), vec![1]);
    assert_eq!(search(&index, "title", TermNode::Number("+007".into())), vec![1]);
    assert_eq!(search_string(&index, "title", "007"), vec![1]);
    assert!(search(&index, "title", TermNode::Number("42".into())).is_empty());
    Ok(())
}

#[test]
fn test_textual_values_in_numeric_fields() -> memindex::Result<()> {
    let schema = Schema::builder()
        .add_field("year", DataType::Int64)
        .add_field("price", DataType::Float64)
        .build();
    let index = MemoryIndex::builder(schema).config(small_config()).build()?;

    index.insert_document(1, Document::new().add_keyword("year", "+2024"));
    index.insert_document(2, Document::new().add_text("year", "2024.0"));
    index.insert_document(3, Document::new().add_integer("year", 2024));
    index.insert_document(4, Document::new().add_keyword("price", "19.50"));
    commit_and_wait(&index)?;

    assert_eq!(search(&index, "year", TermNode::Number("2024".into())), vec![1, 2, 3]);
    assert_eq!(search_string(&index, "year", "+2024"), vec![1, 2, 3]);
    assert_eq!(search(&index, "price", TermNode::Number("19.5".into())), vec![4]);
    assert_eq!(index.num_words(), 2);
    Ok(())
}

#[test]
fn test_reinsert_churn_keeps_feature_memory_bounded() -> memindex::Result<()> {
    let index = title_index()?;
    index.insert_document(1, Document::new().add_text("title", "red shoes"));
    commit_and_wait(&index)?;
    let baseline = index.memory_usage();

    for _ in 0..500 {
        index.insert_document(1, Document::new().add_text("title", "red shoes"));
        commit_and_wait(&index)?;
    }

    let usage = index.memory_usage();
    assert_eq!(index.num_words(), 2);
    assert_eq!(search_string(&index, "title", "red"), vec![1]);
    assert!(usage.dead_bytes < 2048, "dead bytes {}", usage.dead_bytes);
    assert!(
        usage.allocated_bytes < baseline.allocated_bytes + 8192,
        "allocated {} after churn, {} before",
        usage.allocated_bytes,
        baseline.allocated_bytes
    );

    let mut match_data = TermFieldMatchData::new(0);
    let blueprint = index.create_blueprint(
        &RequestContext::new(),
        &FieldSpec::new("title"),
        &TermNode::String("shoes".into()),
    );
    blueprint.create_leaf_search().unpack(&mut match_data)?;
    assert_eq!(match_data.positions[0].position, 1);
    Ok(())
}

#[test]
fn test_term_kinds() -> memindex::Result<()> {
    let index = title_index()?;
    index.insert_document(1, Document::new().add_text("title", "red shoes"));
    commit_and_wait(&index)?;

    for term in [
        TermNode::Prefix("red".into()),
        TermNode::Suffix("red".into()),
        TermNode::Substring("red".into()),
        TermNode::Range("red".into()),
        TermNode::Location("red".into()),
        TermNode::Regexp("red".into()),
    ] {
        assert_eq!(search(&index, "title", term), vec![1]);
    }
    assert!(search(&index, "title", TermNode::Predicate("red".into())).is_empty());
    assert!(search_string(&index, "missing", "red").is_empty());
    Ok(())
}

#[test]
fn test_array_positions_and_filter_fields() -> memindex::Result<()> {
    let schema = Schema::builder()
        .add_collection_field("tags", DataType::String, CollectionType::Array)
        .add_collection_field("cats", DataType::String, CollectionType::WeightedSet)
        .build();
    let index = MemoryIndex::builder(schema).config(small_config()).build()?;

    index.insert_document(
        7,
        Document::new()
            .add_text_array("tags", ["summer sale", "red"])
            .add_weighted_set("cats", [("shoes", 40)]),
    );
    commit_and_wait(&index)?;

    let blueprint = index.create_blueprint(
        &RequestContext::new(),
        &FieldSpec::new("tags"),
        &TermNode::String("sale".into()),
    );
    assert_eq!(blueprint.estimate().est_hits, 1);
    let mut search = blueprint.create_leaf_search();
    let mut match_data = TermFieldMatchData::new(0);
    search.unpack(&mut match_data)?;
    assert_eq!(match_data.doc_id, 7);
    assert_eq!(match_data.positions[0].element_id, 0);
    assert_eq!(match_data.positions[0].position, 1);
    assert_eq!(match_data.positions[0].element_len, 2);

    let weighted = index.create_blueprint(
        &RequestContext::new(),
        &FieldSpec::new("cats"),
        &TermNode::String("shoes".into()),
    );
    let mut search = weighted.create_leaf_search();
    let mut match_data = TermFieldMatchData::new(1);
    search.unpack(&mut match_data)?;
    assert_eq!(match_data.positions[0].element_weight, 40);

    let filter = index.create_blueprint(
        &RequestContext::new(),
        &FieldSpec::filter("cats"),
        &TermNode::String("shoes".into()),
    );
    let mut search = filter.create_leaf_search();
    search.unpack(&mut match_data)?;
    assert_eq!(match_data.doc_id, 7);
    assert!(!match_data.has_positions());
    Ok(())
}

#[test]
fn test_missing_field_on_reinsert_clears_it() -> memindex::Result<()> {
    let schema = Schema::builder()
        .add_text_field("title")
        .add_text_field("body")
        .build();
    let index = MemoryIndex::builder(schema).config(small_config()).build()?;

    let doc = Document::builder()
        .add_field("title", DataValue::Text("red".into()))
        .add_field("body", DataValue::Text("long text".into()))
        .build();
    index.insert_document(1, doc);
    commit_and_wait(&index)?;

    index.insert_document(1, Document::new().add_text("title", "red"));
    commit_and_wait(&index)?;

    assert_eq!(search_string(&index, "title", "red"), vec![1]);
    assert!(search_string(&index, "body", "text").is_empty());
    Ok(())
}

#[test]
fn test_statistics() -> memindex::Result<()> {
    let index = title_index()?;
    let empty_usage = index.memory_usage();

    for doc_id in 1..=20 {
        let doc = Document::new().add_text("title", format!("word{doc_id} common"));
        index.insert_document(doc_id, doc);
    }
    commit_and_wait(&index)?;

    assert_eq!(index.num_docs(), 20);
    assert_eq!(index.doc_id_limit(), 21);
    assert_eq!(index.num_words(), 21);
    assert!(index.memory_usage().allocated_bytes > empty_usage.allocated_bytes);
    assert_eq!(search_string(&index, "title", "common").len(), 20);
    Ok(())
}

#[test]
fn test_commit_callback_runs_without_changes() -> memindex::Result<()> {
    let index = title_index()?;
    commit_and_wait(&index)?;
    commit_and_wait(&index)?;
    assert_eq!(index.num_docs(), 0);
    Ok(())
}

#[test]
fn test_invert_failure_is_reported_by_commit() -> memindex::Result<()> {
    let index = title_index()?;
    let nested = DataValue::Array(vec![DataValue::Array(vec![])]);
    index.insert_document(1, Document::new().add_field("title", nested));
    index.insert_document(2, Document::new().add_text("title", "fine"));

    let err = index.commit(|_| {}).unwrap_err();
    assert!(err.is_task_failure());

    // The rest of the batch still lands.
    index.sync()?;
    assert_eq!(search_string(&index, "title", "fine"), vec![2]);
    Ok(())
}
