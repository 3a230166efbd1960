use chrono::{NaiveDate, TimeZone, Utc};
use kv_record::{
    Condition, Database, Direction, MemoryStore, Model, PropertyKind, Query, Record, Relationship,
    Store, Value, keys,
};

fn book_model() -> Model {
    Model::new("book")
        .key("id", PropertyKind::Serial)
        .indexed("title", PropertyKind::String)
        .property("pages", PropertyKind::Integer)
        .property("published_on", PropertyKind::Date)
        .property("created_at", PropertyKind::DateTime)
        .foreign_key("author_id", PropertyKind::Integer)
}

fn author_model() -> Model {
    Model::new("author")
        .key("id", PropertyKind::Serial)
        .indexed("name", PropertyKind::String)
}

fn tag_model() -> Model {
    Model::new("tag")
        .key("id", PropertyKind::Serial)
        .indexed("name", PropertyKind::String)
}

fn book_tag_model() -> Model {
    Model::new("book_tag")
        .key("id", PropertyKind::Serial)
        .foreign_key("book_id", PropertyKind::Integer)
        .foreign_key("tag_id", PropertyKind::Integer)
}

fn tags() -> Relationship {
    Relationship::ManyToMany {
        join_model: book_tag_model(),
        near_field: "book_id".to_string(),
        far_field: "tag_id".to_string(),
    }
}

fn db() -> (Database<MemoryStore>, MemoryStore) {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = MemoryStore::new();
    (Database::new(store.clone()), store)
}

async fn seed_books(db: &mut Database<MemoryStore>) -> Vec<Record> {
    let mut records = vec![
        Record::new().with("title", "dune").with("pages", 30i64),
        Record::new().with("title", "emma").with("pages", 10i64),
        Record::new().with("title", "dune").with("pages", 20i64),
    ];
    db.create(&book_model(), &mut records).await.unwrap();
    records
}

fn titles(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.get("title").unwrap().to_stored())
        .collect()
}

#[tokio::test]
async fn create_assigns_monotonic_serial_identities() {
    let (mut db, _) = db();
    let records = seed_books(&mut db).await;
    let ids: Vec<_> = records.iter().map(|r| r.get("id").cloned()).collect();
    assert_eq!(
        ids,
        vec![
            Some(Value::Int(1)),
            Some(Value::Int(2)),
            Some(Value::Int(3))
        ]
    );
}

#[tokio::test]
async fn round_trip_by_primary_key_preserves_typed_values() {
    let (mut db, _) = db();
    let model = book_model();
    let created_at = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
    let published_on = NaiveDate::from_ymd_opt(1965, 8, 1).unwrap();
    let mut records = vec![
        Record::new()
            .with("title", "dune")
            .with("pages", 412i64)
            .with("published_on", published_on)
            .with("created_at", created_at),
    ];
    db.create(&model, &mut records).await.unwrap();
    let id = records[0].get("id").cloned().unwrap();

    let found = db
        .read(&Query::new(model).filter(Condition::eq("id", id)))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("title"), Some(&Value::Str("dune".into())));
    assert_eq!(found[0].get("pages"), Some(&Value::Int(412)));
    assert_eq!(found[0].get("published_on"), Some(&Value::Date(published_on)));
    assert_eq!(found[0].get("created_at"), Some(&Value::DateTime(created_at)));
}

#[tokio::test]
async fn create_populates_all_keys_and_field_indexes() {
    let (mut db, mut store) = db();
    seed_books(&mut db).await;
    let model = book_model();

    let all = store.set_members(&keys::all_keys_set(&model)).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.contains("1"));

    let dune = store
        .set_members(&keys::field_index("book", "title", &Value::from("dune")))
        .await
        .unwrap();
    assert_eq!(dune.len(), 2);
    assert!(dune.contains("1") && dune.contains("3"));
}

#[tokio::test]
async fn equality_on_indexed_field_is_exact() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let found = db
        .read(&Query::new(book_model()).filter(Condition::eq("title", "dune")))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert!(titles(&found).iter().all(|t| t == "dune"));
}

#[tokio::test]
async fn equality_on_unindexed_field_falls_back_to_scan() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let found = db
        .read(&Query::new(book_model()).filter(Condition::eq("pages", 10i64)))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("title"), Some(&Value::Str("emma".into())));
}

#[tokio::test]
async fn equality_on_unseen_value_returns_nothing() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let found = db
        .read(&Query::new(book_model()).filter(Condition::eq("title", "middlemarch")))
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn negation_is_the_complement_within_live_records() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let model = book_model();
    let matched = db
        .read(&Query::new(model.clone()).filter(Condition::eq("title", "dune")))
        .await
        .unwrap();
    let complement = db
        .read(&Query::new(model.clone()).filter(Condition::ne("title", "dune")))
        .await
        .unwrap();
    assert_eq!(matched.len() + complement.len(), 3);
    assert!(titles(&complement).iter().all(|t| t != "dune"));
}

#[tokio::test]
async fn primary_key_leaves_probe_the_all_keys_set() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let model = book_model();
    let one = db
        .read(&Query::new(model.clone()).filter(Condition::eq("id", 2i64)))
        .await
        .unwrap();
    assert_eq!(titles(&one), vec!["emma"]);

    let rest = db
        .read(&Query::new(model.clone()).filter(Condition::ne("id", 2i64)))
        .await
        .unwrap();
    assert_eq!(rest.len(), 2);

    let missing = db
        .read(&Query::new(model).filter(Condition::eq("id", 99i64)))
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn inclusion_equals_the_union_of_equalities() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let found = db
        .read(&Query::new(book_model()).filter(Condition::one_of("title", ["dune", "emma"])))
        .await
        .unwrap();
    assert_eq!(found.len(), 3);
}

#[tokio::test]
async fn inclusion_with_an_unseen_value_still_answers_correctly() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    // "middlemarch" has no index set, so the leaf cannot be answered from
    // indexes; the scan fallback must produce the same rows regardless
    let found = db
        .read(&Query::new(book_model()).filter(Condition::one_of("title", ["emma", "middlemarch"])))
        .await
        .unwrap();
    assert_eq!(titles(&found), vec!["emma"]);
}

#[tokio::test]
async fn negated_inclusion_is_the_complement_of_the_union() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let mut extra = vec![Record::new().with("title", "persuasion").with("pages", 40i64)];
    db.create(&book_model(), &mut extra).await.unwrap();

    let found = db
        .read(
            &Query::new(book_model())
                .filter(Condition::one_of("title", ["dune", "emma"]).negate()),
        )
        .await
        .unwrap();
    assert_eq!(titles(&found), vec!["persuasion"]);
}

#[tokio::test]
async fn and_intersects_and_or_unions() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let model = book_model();

    let both = db
        .read(&Query::new(model.clone()).filter(Condition::all(vec![
            Condition::eq("title", "dune"),
            Condition::eq("id", 1i64),
        ])))
        .await
        .unwrap();
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].get("id"), Some(&Value::Int(1)));

    let either = db
        .read(&Query::new(model).filter(Condition::any(vec![
            Condition::eq("title", "emma"),
            Condition::eq("id", 1i64),
        ])))
        .await
        .unwrap();
    assert_eq!(either.len(), 2);
}

#[tokio::test]
async fn and_with_an_unindexed_branch_stays_exact() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    // title resolves from its index, pages cannot; the indexed branch bounds
    // the candidates and the in-memory predicate applies the rest
    let found = db
        .read(&Query::new(book_model()).filter(Condition::all(vec![
            Condition::eq("title", "dune"),
            Condition::eq("pages", 20i64),
        ])))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get("pages"), Some(&Value::Int(20)));
}

#[tokio::test]
async fn or_with_an_unindexed_branch_falls_back_and_stays_exact() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let found = db
        .read(&Query::new(book_model()).filter(Condition::any(vec![
            Condition::eq("title", "emma"),
            Condition::eq("pages", 20i64),
        ])))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn update_moves_index_membership_to_the_new_value() {
    let (mut db, mut store) = db();
    let model = book_model();
    let mut records = vec![Record::new().with("title", "dune")];
    db.create(&model, &mut records).await.unwrap();

    db.update(
        &[("title".to_string(), Some(Value::from("emma")))],
        &Query::new(model.clone()).filter(Condition::eq("title", "dune")),
    )
    .await
    .unwrap();

    let old_index = keys::field_index("book", "title", &Value::from("dune"));
    assert!(!store.exists(&old_index).await.unwrap());
    let new_members = store
        .set_members(&keys::field_index("book", "title", &Value::from("emma")))
        .await
        .unwrap();
    assert!(new_members.contains("1"));

    let stale = db
        .read(&Query::new(model.clone()).filter(Condition::eq("title", "dune")))
        .await
        .unwrap();
    assert!(stale.is_empty());
    let fresh = db
        .read(&Query::new(model).filter(Condition::eq("title", "emma")))
        .await
        .unwrap();
    assert_eq!(fresh.len(), 1);
}

#[tokio::test]
async fn update_to_null_deletes_the_hash_field() {
    let (mut db, _) = db();
    let model = book_model();
    let mut records = vec![Record::new().with("title", "dune").with("pages", 412i64)];
    db.create(&model, &mut records).await.unwrap();

    db.update(
        &[("pages".to_string(), None)],
        &Query::new(model.clone()).filter(Condition::eq("id", 1i64)),
    )
    .await
    .unwrap();

    let found = db
        .read(&Query::new(model).filter(Condition::eq("id", 1i64)))
        .await
        .unwrap();
    assert_eq!(found[0].get("pages"), None);
    assert_eq!(found[0].get("title"), Some(&Value::Str("dune".into())));
}

#[tokio::test]
async fn update_rejects_primary_key_changes() {
    let (mut db, _) = db();
    let model = book_model();
    let result = db
        .update(
            &[("id".to_string(), Some(Value::Int(9)))],
            &Query::new(model),
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn delete_cleans_all_keys_indexes_and_hash() {
    let (mut db, mut store) = db();
    seed_books(&mut db).await;
    let model = book_model();

    db.delete(&Query::new(model.clone()).filter(Condition::eq("title", "dune")))
        .await
        .unwrap();

    let all = store.set_members(&keys::all_keys_set(&model)).await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(!all.contains("1") && !all.contains("3"));
    assert!(
        !store
            .exists(&keys::field_index("book", "title", &Value::from("dune")))
            .await
            .unwrap()
    );
    assert!(
        store
            .hash_get_all(&keys::record_hash("book", "1"))
            .await
            .unwrap()
            .is_empty()
    );

    let found = db
        .read(&Query::new(model).filter(Condition::eq("title", "dune")))
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn many_to_one_traversal_returns_exactly_the_children() {
    let (mut db, _) = db();
    let mut authors = vec![
        Record::new().with("name", "herbert"),
        Record::new().with("name", "austen"),
    ];
    db.create(&author_model(), &mut authors).await.unwrap();
    let herbert = authors[0].get("id").cloned().unwrap();

    let model = book_model();
    let mut books = vec![
        Record::new().with("title", "dune").with("author_id", herbert.clone()),
        Record::new()
            .with("title", "dune messiah")
            .with("author_id", herbert.clone()),
        Record::new().with("title", "emma").with("author_id", 2i64),
    ];
    db.create(&model, &mut books).await.unwrap();

    let by_author = Relationship::ManyToOne {
        child_field: "author_id".to_string(),
    };
    let found = db
        .read(&Query::new(model.clone()).filter(Condition::related(by_author.clone(), herbert)))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert!(titles(&found).iter().all(|t| t.starts_with("dune")));

    let none = db
        .read(&Query::new(model).filter(Condition::related(by_author, 99i64)))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn negated_many_to_one_returns_the_other_children() {
    let (mut db, _) = db();
    let mut authors = vec![
        Record::new().with("name", "herbert"),
        Record::new().with("name", "austen"),
    ];
    db.create(&author_model(), &mut authors).await.unwrap();
    let herbert = authors[0].get("id").cloned().unwrap();

    let model = book_model();
    let mut books = vec![
        Record::new().with("title", "dune").with("author_id", herbert.clone()),
        Record::new()
            .with("title", "dune messiah")
            .with("author_id", herbert.clone()),
        Record::new().with("title", "emma").with("author_id", 2i64),
    ];
    db.create(&model, &mut books).await.unwrap();

    let by_author = Relationship::ManyToOne {
        child_field: "author_id".to_string(),
    };
    let others = db
        .read(&Query::new(model).filter(Condition::related(by_author, herbert).negate()))
        .await
        .unwrap();
    assert_eq!(titles(&others), vec!["emma"]);
}

#[tokio::test]
async fn many_to_many_traversal_through_the_join_model() {
    let (mut db, _) = db();

    let mut books = vec![Record::new().with("title", "Harry Potter")];
    db.create(&book_model(), &mut books).await.unwrap();
    let book_id = books[0].get("id").cloned().unwrap();

    let mut tag_rows = vec![
        Record::new().with("name", "fiction"),
        Record::new().with("name", "wizards"),
    ];
    db.create(&tag_model(), &mut tag_rows).await.unwrap();
    let fiction = tag_rows[0].get("id").cloned().unwrap();
    let wizards = tag_rows[1].get("id").cloned().unwrap();

    let mut joins = vec![
        Record::new()
            .with("book_id", book_id.clone())
            .with("tag_id", fiction.clone()),
        Record::new()
            .with("book_id", book_id.clone())
            .with("tag_id", wizards),
    ];
    db.create(&book_tag_model(), &mut joins).await.unwrap();

    let tagged = db
        .read(&Query::new(book_model()).filter(Condition::related(tags(), fiction.clone())))
        .await
        .unwrap();
    assert_eq!(titles(&tagged), vec!["Harry Potter"]);

    // dropping the join record severs the association
    db.delete(&Query::new(book_tag_model()).filter(Condition::eq("tag_id", fiction.clone())))
        .await
        .unwrap();
    let tagged = db
        .read(&Query::new(book_model()).filter(Condition::related(tags(), fiction)))
        .await
        .unwrap();
    assert!(tagged.is_empty());
}

#[tokio::test]
async fn negated_many_to_many_complements_within_live_records() {
    let (mut db, _) = db();

    let mut books = vec![
        Record::new().with("title", "Harry Potter"),
        Record::new().with("title", "dune"),
    ];
    db.create(&book_model(), &mut books).await.unwrap();
    let potter_id = books[0].get("id").cloned().unwrap();

    let mut tag_rows = vec![Record::new().with("name", "fiction")];
    db.create(&tag_model(), &mut tag_rows).await.unwrap();
    let fiction = tag_rows[0].get("id").cloned().unwrap();

    let mut joins = vec![
        Record::new()
            .with("book_id", potter_id)
            .with("tag_id", fiction.clone()),
    ];
    db.create(&book_tag_model(), &mut joins).await.unwrap();

    let untagged = db
        .read(&Query::new(book_model()).filter(Condition::related(tags(), fiction).negate()))
        .await
        .unwrap();
    assert_eq!(titles(&untagged), vec!["dune"]);
}

#[tokio::test]
async fn empty_condition_enumerates_everything() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let found = db.read(&Query::new(book_model())).await.unwrap();
    assert_eq!(found.len(), 3);
}

#[tokio::test]
async fn empty_condition_delegates_order_and_limit_to_the_store() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let model = book_model();

    let asc = db
        .read(&Query::new(model.clone()).order_by("pages", Direction::Ascending))
        .await
        .unwrap();
    assert_eq!(titles(&asc), vec!["emma", "dune", "dune"]);

    let page = db
        .read(
            &Query::new(model)
                .order_by("pages", Direction::Descending)
                .offset(1)
                .limit(1),
        )
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].get("pages"), Some(&Value::Int(20)));
}

#[tokio::test]
async fn ordering_after_filtering_is_applied_in_memory() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let found = db
        .read(
            &Query::new(book_model())
                .filter(Condition::eq("title", "dune"))
                .order_by("pages", Direction::Descending),
        )
        .await
        .unwrap();
    let pages: Vec<_> = found.iter().map(|r| r.get("pages").cloned()).collect();
    assert_eq!(pages, vec![Some(Value::Int(30)), Some(Value::Int(20))]);
}

#[tokio::test]
async fn projection_restricts_returned_fields() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let found = db
        .read(
            &Query::new(book_model())
                .filter(Condition::eq("title", "emma"))
                .select(["title"]),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].len(), 1);
    assert_eq!(found[0].get("title"), Some(&Value::Str("emma".into())));
    assert_eq!(found[0].get("pages"), None);
}

#[tokio::test]
async fn count_and_first_helpers() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    let query = Query::new(book_model()).filter(Condition::eq("title", "dune"));
    assert_eq!(db.count(&query).await.unwrap(), 2);
    assert!(db.first(&query).await.unwrap().is_some());
    assert_eq!(
        db.first(&Query::new(book_model()).filter(Condition::eq("title", "persuasion")))
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn flush_all_empties_the_store() {
    let (mut db, _) = db();
    seed_books(&mut db).await;
    db.flush_all().await.unwrap();
    assert!(db.read(&Query::new(book_model())).await.unwrap().is_empty());
}
