use crate::common::TestDatabase;
use lucid::relation::{Preload, RelationLoader};
use lucid::sea_query::{Order, Value};
use lucid::{Collection, Op, Related};

#[test]
fn has_many_loads_in_one_extra_query() {
    let db = TestDatabase::new();
    let users = db
        .builder("User")
        .order_by("id", Order::Asc)
        .with(["posts"])
        .unwrap()
        .all(&db.conn)
        .unwrap();

    assert_eq!(
        db.take_queries(),
        [
            "SELECT * FROM `users` ORDER BY `id` ASC",
            "SELECT * FROM `posts` WHERE `posts`.`user_id` IN (?, ?)",
        ]
    );
    let ada = users.find(1).unwrap();
    assert_eq!(ada.related_many("posts").unwrap().len(), 2);
    let grace = users.find(2).unwrap();
    let titles: Vec<Value> = grace.related_many("posts").unwrap().column("title");
    assert_eq!(titles, vec![Value::from("third")]);
}

#[test]
fn nested_paths_run_one_query_per_segment() {
    let db = TestDatabase::new();
    let users = db
        .builder("User")
        .with(["posts.comments"])
        .unwrap()
        .all(&db.conn)
        .unwrap();

    assert_eq!(db.take_queries().len(), 3);
    let ada = users.find(1).unwrap();
    let posts = ada.related_many("posts").unwrap();
    let first = posts.find(1).unwrap();
    assert_eq!(first.related_many("comments").unwrap().len(), 2);
    let second = posts.find(2).unwrap();
    assert_eq!(second.related_many("comments").unwrap().len(), 1);

    let grace = users.find(2).unwrap();
    let third = grace.related_many("posts").unwrap().first().unwrap();
    assert!(third.related_many("comments").unwrap().is_empty());
}

#[test]
fn with_count_defaults_to_zero() {
    let db = TestDatabase::new();
    let posts = db
        .builder("Post")
        .order_by("id", Order::Asc)
        .with_count(["comments"])
        .unwrap()
        .all(&db.conn)
        .unwrap();

    assert_eq!(db.take_queries().len(), 2);
    let counts: Vec<Value> = posts.column("comments_count");
    assert_eq!(
        counts,
        vec![Value::from(2i64), Value::from(1i64), Value::from(0i64)]
    );
    let json = posts.to_json();
    assert_eq!(json[2]["meta"]["comments_count"], serde_json::json!(0));
}

#[test]
fn already_present_relation_is_not_refetched() {
    let db = TestDatabase::new();
    let mut posts = db
        .builder("Post")
        .order_by("id", Order::Asc)
        .all(&db.conn)
        .unwrap();
    assert_eq!(posts.len(), 3);
    posts.as_mut_slice()[1].set_relation("comments", Related::Many(Collection::new()));
    db.take_queries();

    RelationLoader::new(&db.registry, &db.conn)
        .load(
            posts.as_mut_slice(),
            &[Preload::from("comments"), Preload::from("author")],
        )
        .unwrap();

    let queries = db.take_queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].starts_with("SELECT * FROM `users`"));
    assert!(!posts.get(0).unwrap().relation_loaded("comments"));
    assert!(posts.iter().all(|post| post.related_one("author").is_some()));
}

#[test]
fn constrained_preload_filters_children() {
    let db = TestDatabase::new();
    let users = db
        .builder("User")
        .with([Preload::constrained("posts", |q| q.where_true("published"))])
        .unwrap()
        .all(&db.conn)
        .unwrap();

    let ada = users.find(1).unwrap();
    let posts = ada.related_many("posts").unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts.first().unwrap().raw("title"), Some(&Value::from("first")));
}

#[test]
fn belongs_to_chain() {
    let db = TestDatabase::new();
    let comment = db
        .builder("Comment")
        .with(["post.author"])
        .unwrap()
        .find(&db.conn, 3)
        .unwrap()
        .unwrap();

    let post = comment.related_one("post").unwrap();
    assert_eq!(post.key(), Some(&Value::from(2i64)));
    let author = post.related_one("author").unwrap();
    assert_eq!(author.get_as::<String>("name").unwrap().as_deref(), Some("ada"));
}

#[test]
fn morph_to_resolves_each_type() {
    let db = TestDatabase::new();
    let images = db
        .builder("Image")
        .order_by("id", Order::Asc)
        .with(["imageable"])
        .unwrap()
        .all(&db.conn)
        .unwrap();

    // images, then one query per distinct type
    assert_eq!(db.take_queries().len(), 3);
    let post = images.get(0).unwrap().related_one("imageable").unwrap();
    assert_eq!(post.model_name(), "Post");
    assert_eq!(post.raw("title"), Some(&Value::from("first")));
    let video = images.get(1).unwrap().related_one("imageable").unwrap();
    assert_eq!(video.model_name(), "Video");
    assert_eq!(video.raw("title"), Some(&Value::from("intro")));
}

#[test]
fn morph_many_scopes_by_type() {
    let db = TestDatabase::new();
    let video = db
        .builder("Video")
        .with(["images"])
        .unwrap()
        .first_or_fail(&db.conn)
        .unwrap();
    let images = video.related_many("images").unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images.first().unwrap().raw("url"), Some(&Value::from("/video.png")));
}

#[test]
fn has_many_through_groups_by_far_parent() {
    let db = TestDatabase::new();
    let users = db
        .builder("User")
        .with(["comments"])
        .unwrap()
        .all(&db.conn)
        .unwrap();

    assert_eq!(users.find(1).unwrap().related_many("comments").unwrap().len(), 3);
    assert!(users.find(2).unwrap().related_many("comments").unwrap().is_empty());
}

#[test]
fn relation_existence_filters() {
    let db = TestDatabase::new();

    let with_drafts = db
        .builder("User")
        .where_has("posts", |q| q.where_false("published"))
        .unwrap()
        .all(&db.conn)
        .unwrap();
    assert_eq!(with_drafts.ids(), vec![Value::from(1i64)]);

    let uncommented = db
        .builder("Post")
        .doesnt_have("comments")
        .unwrap()
        .all(&db.conn)
        .unwrap();
    assert_eq!(uncommented.ids(), vec![Value::from(3i64)]);

    let busy = db
        .builder("Post")
        .has_count("comments", Op::Gte, 2)
        .unwrap()
        .all(&db.conn)
        .unwrap();
    assert_eq!(busy.ids(), vec![Value::from(1i64)]);

    let commented_authors = db
        .builder("User")
        .has("posts.comments")
        .unwrap()
        .count(&db.conn)
        .unwrap();
    assert_eq!(commented_authors, 1);
}

#[test]
fn related_query_scopes_to_parent() {
    let db = TestDatabase::new();
    let ada = db.builder("User").find_or_fail(&db.conn, 1).unwrap();
    let drafts = ada
        .related_query(&db.registry, "posts")
        .unwrap()
        .where_false("published")
        .all(&db.conn)
        .unwrap();
    assert_eq!(drafts.ids(), vec![Value::from(2i64)]);
}
