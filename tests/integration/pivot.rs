use crate::common::TestDatabase;
use lucid::sea_query::Value;
use lucid::{record, Query};

fn tag_post_and_video(db: &TestDatabase) {
    let post = db.builder("Post").find_or_fail(&db.conn, 1).unwrap();
    let video = db.builder("Video").find_or_fail(&db.conn, 1).unwrap();
    assert_eq!(post.pivot(&db.registry, "tags").unwrap().attach(&db.conn, [1, 2]).unwrap(), 2);
    assert_eq!(video.pivot(&db.registry, "tags").unwrap().attach(&db.conn, [2, 3]).unwrap(), 2);
    db.take_queries();
}

#[test]
fn morph_pivot_rows_carry_the_type() {
    let db = TestDatabase::new();
    tag_post_and_video(&db);

    let rows = Query::table("taggables")
        .where_eq("taggable_type", "videos")
        .pluck(&db.conn, "tag_id")
        .unwrap();
    assert_eq!(rows, vec![Value::from(2i64), Value::from(3i64)]);
}

#[test]
fn eager_morph_to_many_is_scoped_by_type() {
    let db = TestDatabase::new();
    tag_post_and_video(&db);

    let post = db
        .builder("Post")
        .with(["tags"])
        .unwrap()
        .find_or_fail(&db.conn, 1)
        .unwrap();
    let tags = post.related_many("tags").unwrap();
    assert_eq!(tags.column("name"), vec![Value::from("rust"), Value::from("sql")]);
    assert_eq!(
        tags.first().unwrap().extra("pivot_taggable_id"),
        Some(&Value::from(1i64))
    );
    assert!(tags.first().unwrap().attributes().get("pivot_taggable_id").is_none());

    let tag = db
        .builder("Tag")
        .with(["posts", "videos"])
        .unwrap()
        .find_or_fail(&db.conn, 3)
        .unwrap();
    assert!(tag.related_many("posts").unwrap().is_empty());
    assert_eq!(tag.related_many("videos").unwrap().ids(), vec![Value::from(1i64)]);
}

#[test]
fn detach_all_leaves_other_types_alone() {
    let db = TestDatabase::new();
    tag_post_and_video(&db);

    let post = db.builder("Post").find_or_fail(&db.conn, 1).unwrap();
    let removed = post.pivot(&db.registry, "tags").unwrap().detach(&db.conn, None).unwrap();
    assert_eq!(removed, 2);

    let remaining = Query::table("taggables").count(&db.conn).unwrap();
    assert_eq!(remaining, 2);
    let video = db.builder("Video").find_or_fail(&db.conn, 1).unwrap();
    let ids = video.pivot(&db.registry, "tags").unwrap().related_ids(&db.conn).unwrap();
    assert_eq!(ids, vec![Value::from(2i64), Value::from(3i64)]);
}

#[test]
fn sync_diffs_against_current_rows() {
    let db = TestDatabase::new();
    tag_post_and_video(&db);

    let video = db.builder("Video").find_or_fail(&db.conn, 1).unwrap();
    let tags = video.pivot(&db.registry, "tags").unwrap();
    let result = tags.sync(&db.conn, [3, 1]).unwrap();
    assert_eq!(result.attached, vec![Value::from(1i32)]);
    assert_eq!(result.detached, vec![Value::from(2i64)]);

    let mut ids: Vec<i64> = tags
        .related_ids(&db.conn)
        .unwrap()
        .iter()
        .filter_map(|v| lucid::value::FromValue::from_value(v))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, [1, 3]);

    // untouched: the post shares id 1 with the video
    let post = db.builder("Post").find_or_fail(&db.conn, 1).unwrap();
    let post_ids = post.pivot(&db.registry, "tags").unwrap().related_ids(&db.conn).unwrap();
    assert_eq!(post_ids.len(), 2);
}

#[test]
fn tag_existence_through_pivot() {
    let db = TestDatabase::new();
    tag_post_and_video(&db);

    let tagged_rust = db
        .builder("Post")
        .where_has("tags", |q| q.where_eq("tags.name", "rust"))
        .unwrap()
        .all(&db.conn)
        .unwrap();
    assert_eq!(tagged_rust.ids(), vec![Value::from(1i64)]);

    let untagged = db
        .builder("Post")
        .doesnt_have("tags")
        .unwrap()
        .count(&db.conn)
        .unwrap();
    assert_eq!(untagged, 2);
}

#[test]
fn attach_with_extra_columns() {
    let db = TestDatabase::new();
    db.conn
        .execute_batch("ALTER TABLE taggables ADD COLUMN weight INTEGER")
        .unwrap();
    let post = db.builder("Post").find_or_fail(&db.conn, 2).unwrap();
    post.pivot(&db.registry, "tags")
        .unwrap()
        .attach_with(&db.conn, 1, record! { "weight" => 5 })
        .unwrap();

    let weight = Query::table("taggables")
        .where_eq("taggable_id", 2)
        .where_eq("taggable_type", "posts")
        .column(&db.conn, "weight")
        .unwrap();
    assert_eq!(weight, Some(Value::from(5i64)));
}

#[test]
fn prefixed_model_columns_are_not_pivot_data() {
    let db = TestDatabase::new();
    db.conn
        .execute_batch("ALTER TABLE tags ADD COLUMN pivot_order INTEGER NOT NULL DEFAULT 7")
        .unwrap();
    tag_post_and_video(&db);

    let post = db
        .builder("Post")
        .with(["tags"])
        .unwrap()
        .find_or_fail(&db.conn, 1)
        .unwrap();
    let tag = post.related_many("tags").unwrap().first().cloned().unwrap();
    assert_eq!(tag.attributes().get("pivot_order"), Some(&Value::from(7i64)));
    assert!(tag.extra("pivot_order").is_none());
    assert_eq!(tag.extra("pivot_taggable_id"), Some(&Value::from(1i64)));

    let lazy = post
        .related_query(&db.registry, "tags")
        .unwrap()
        .all(&db.conn)
        .unwrap();
    let first = lazy.first().unwrap();
    assert_eq!(first.attributes().get("pivot_order"), Some(&Value::from(7i64)));
    assert!(first.attributes().get("pivot_taggable_id").is_none());
}
