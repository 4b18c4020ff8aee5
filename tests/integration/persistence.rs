use crate::common::TestDatabase;
use lucid::sea_query::Value;
use lucid::{record, Entity, LucidError};
use serde_json::json;

#[test]
fn create_applies_casts_and_timestamps() {
    let db = TestDatabase::new();
    let post = db
        .builder("Post")
        .create(
            &db.conn,
            record! {
                "user_id" => 2,
                "title" => "fourth",
                "published" => true,
                "meta" => json!({"pinned": true}),
            },
        )
        .unwrap();

    assert_eq!(post.key(), Some(&Value::from(4i64)));
    assert!(post.exists());
    assert!(!post.is_dirty());
    assert!(post.raw("created_at").is_some());

    let stored = db.builder("Post").find_or_fail(&db.conn, 4).unwrap();
    assert_eq!(stored.raw("published"), Some(&Value::from(1i64)));
    assert_eq!(stored.get_as::<bool>("published").unwrap(), Some(true));
    assert_eq!(
        stored.get_as::<serde_json::Value>("meta").unwrap(),
        Some(json!({"pinned": true}))
    );
    assert_eq!(stored.raw("created_at"), post.raw("created_at"));
}

#[test]
fn save_writes_only_dirty_attributes() {
    let db = TestDatabase::new();
    let mut ada = db.builder("User").find_or_fail(&db.conn, 1).unwrap();
    db.take_queries();

    ada.save(&db.conn).unwrap();
    assert!(db.take_queries().is_empty());

    ada.set("name", "ada lovelace").unwrap();
    assert!(ada.is_dirty());
    assert_eq!(ada.dirty().keys().collect::<Vec<_>>(), ["name"]);
    ada.save(&db.conn).unwrap();
    assert_eq!(
        db.take_queries(),
        ["UPDATE `users` SET `name` = ? WHERE `id` = ?"]
    );

    let reloaded = db.builder("User").find_or_fail(&db.conn, 1).unwrap();
    assert_eq!(
        reloaded.get_as::<String>("name").unwrap().as_deref(),
        Some("ada lovelace")
    );
}

#[test]
fn new_entity_insert_then_update() {
    let db = TestDatabase::new();
    let mut comment = Entity::new(db.registry.model("Comment").unwrap());
    comment
        .fill(record! { "post_id" => 3, "body" => "late" })
        .unwrap();
    assert!(!comment.exists());
    comment.save(&db.conn).unwrap();
    assert_eq!(comment.key(), Some(&Value::from(4i64)));

    comment.set("body", "later").unwrap();
    comment.save(&db.conn).unwrap();
    let bodies = db
        .builder("Comment")
        .where_eq("post_id", 3)
        .all(&db.conn)
        .unwrap()
        .column("body");
    assert_eq!(bodies, vec![Value::from("later")]);
}

#[test]
fn delete_and_refresh() {
    let db = TestDatabase::new();
    let mut comment = db.builder("Comment").find_or_fail(&db.conn, 3).unwrap();
    assert!(comment.delete(&db.conn).unwrap());
    assert!(!comment.exists());
    assert!(db.builder("Comment").find(&db.conn, 3).unwrap().is_none());
    assert!(matches!(
        comment.refresh(&db.conn),
        Err(LucidError::NotFound(_))
    ));
    assert!(matches!(
        db.builder("Comment").find_or_fail(&db.conn, 3),
        Err(LucidError::NotFound(_))
    ));
}

#[test]
fn refresh_drops_loaded_relations() {
    let db = TestDatabase::new();
    let mut post = db
        .builder("Post")
        .with(["comments"])
        .unwrap()
        .find_or_fail(&db.conn, 1)
        .unwrap();
    assert!(post.relation_loaded("comments"));

    lucid::Query::table("posts")
        .where_eq("id", 1)
        .update(&db.conn, record! { "title" => "edited" })
        .unwrap();
    post.refresh(&db.conn).unwrap();
    assert!(!post.relation_loaded("comments"));
    assert_eq!(post.raw("title"), Some(&Value::from("edited")));
}

#[test]
fn builder_bulk_writes() {
    let db = TestDatabase::new();
    let updated = db
        .builder("Post")
        .where_eq("user_id", 1)
        .update(&db.conn, record! { "published" => 1 })
        .unwrap();
    assert_eq!(updated, 2);
    let deleted = db
        .builder("Comment")
        .where_eq("post_id", 1)
        .delete(&db.conn)
        .unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(db.builder("Comment").count(&db.conn).unwrap(), 1);
}

#[test]
fn serialization_hides_fields_and_nests_relations() {
    let db = TestDatabase::new();
    let users = db
        .builder("User")
        .where_eq("id", 2)
        .with(["posts"])
        .unwrap()
        .all(&db.conn)
        .unwrap();

    let json = serde_json::to_value(&users).unwrap();
    let grace = &json[0];
    assert_eq!(grace["name"], json!("grace"));
    assert!(grace.get("email").is_none());
    assert_eq!(grace["posts"][0]["title"], json!("third"));
    assert_eq!(grace["posts"][0]["published"], json!(true));
}
