use crate::common::TestDatabase;
use lucid::connection::transaction;
use lucid::sea_query::{Order, Value};
use lucid::{record, Connection, LucidError, Op, Query};
use std::ops::ControlFlow;

fn seed_products(db: &TestDatabase) {
    Query::table("products")
        .bulk_insert(
            &db.conn,
            vec![
                record! { "id" => 1, "color" => "#000", "price" => 10.0 },
                record! { "id" => 2, "color" => "#FFF", "price" => 25.5 },
            ],
        )
        .unwrap();
    db.take_queries();
}

#[test]
fn or_where_returns_either_match() {
    let db = TestDatabase::new();
    seed_products(&db);

    let query = Query::table("products")
        .where_("color", Op::Eq, "#000")
        .or_where("color", Op::Eq, "#FFF");
    let compiled = query.to_sql().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT * FROM `products` WHERE `color` = ? OR `color` = ?"
    );
    assert_eq!(compiled.bindings, vec![Value::from("#000"), Value::from("#FFF")]);
    assert_eq!(query.all(&db.conn).unwrap().len(), 2);
}

#[test]
fn month_names_and_numbers_bind_alike() {
    let db = TestDatabase::new();
    let by_name = Query::table("posts")
        .where_month("created_at", Op::Eq, "dec")
        .unwrap();
    let by_number = Query::table("posts")
        .where_month("created_at", Op::Eq, 12)
        .unwrap();
    assert_eq!(
        by_name.to_sql().unwrap().bindings,
        by_number.to_sql().unwrap().bindings
    );
    assert_eq!(by_name.count(&db.conn).unwrap(), 2);
    assert!(matches!(
        Query::table("posts").where_month("created_at", Op::Eq, "smarch"),
        Err(LucidError::InvalidArgument(_))
    ));
}

#[test]
fn cursor_streams_and_stops_on_break() {
    let db = TestDatabase::new();
    let query = Query::table("comments").order_by("id", Order::Asc);

    let mut seen = Vec::new();
    query
        .cursor(&db.conn, |row| {
            seen.push(row.get("id").cloned());
            if seen.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
    assert_eq!(seen, vec![Some(Value::from(1i64)), Some(Value::from(2i64))]);

    // a fresh cursor starts over
    let mut total = 0;
    query
        .cursor(&db.conn, |_| {
            total += 1;
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(total, 3);
}

#[test]
fn chunk_visits_every_row_once() {
    let db = TestDatabase::new();
    let rows = (10..15)
        .map(|id| record! { "id" => id, "post_id" => 3, "body" => format!("c{id}") })
        .collect();
    Query::table("comments").bulk_insert(&db.conn, rows).unwrap();

    let mut sizes = Vec::new();
    Query::table("comments")
        .where_eq("post_id", 3)
        .chunk(&db.conn, 2, |rows| {
            sizes.push(rows.len());
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(sizes, vec![2, 2, 1]);

    let mut first_only = 0;
    Query::table("comments")
        .chunk(&db.conn, 2, |_| {
            first_only += 1;
            ControlFlow::Break(())
        })
        .unwrap();
    assert_eq!(first_only, 1);
}

#[test]
fn builder_chunk_and_cursor_hydrate_entities() {
    let db = TestDatabase::new();
    let mut batches = Vec::new();
    db.builder("Post")
        .with(["author"])
        .unwrap()
        .chunk(&db.conn, 2, |posts| {
            batches.push(posts.len());
            assert!(posts.iter().all(|post| post.related_one("author").is_some()));
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(batches, vec![2, 1]);

    let mut titles = Vec::new();
    db.builder("Post")
        .order_by("id", Order::Desc)
        .cursor(&db.conn, |post| {
            titles.push(post.get_as::<String>("title").unwrap().unwrap_or_default());
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(titles, ["third", "second", "first"]);
}

#[test]
fn insert_ignore_skips_duplicates() {
    let db = TestDatabase::new();
    seed_products(&db);

    let skipped = Query::table("products")
        .insert_ignore(&db.conn, record! { "id" => 1, "color" => "#F00" })
        .unwrap();
    assert_eq!(skipped.rows_affected, 0);

    let err = Query::table("products")
        .insert(&db.conn, record! { "id" => 1, "color" => "#F00" })
        .unwrap_err();
    assert!(err.is_duplicate_key());

    let color = Query::table("products")
        .where_eq("id", 1)
        .column(&db.conn, "color")
        .unwrap();
    assert_eq!(color, Some(Value::from("#000")));
}

#[test]
fn aggregates_and_pagination() {
    let db = TestDatabase::new();
    seed_products(&db);

    let products = Query::table("products");
    assert_eq!(products.count(&db.conn).unwrap(), 2);
    assert_eq!(products.sum(&db.conn, "price").unwrap(), Some(35.5));
    assert_eq!(products.max(&db.conn, "price").unwrap(), Some(25.5));

    let page = db.builder("Post").paginate(&db.conn, 2, 2).unwrap();
    assert_eq!(page.total(), 3);
    assert_eq!(page.current_page(), 2);
    assert_eq!(page.items().len(), 1);
    assert!(!page.has_more_pages());

    let per_user = Query::table("posts").count_by(&db.conn, "user_id").unwrap();
    assert_eq!(per_user.len(), 2);
    assert!(per_user.contains(&(Value::from(1i64), 2)));
    assert!(per_user.contains(&(Value::from(2i64), 1)));
}

#[test]
fn increment_and_transactions() {
    let db = TestDatabase::new();
    seed_products(&db);

    Query::table("products")
        .where_eq("id", 1)
        .increment(&db.conn, "price", 5)
        .unwrap();
    assert_eq!(
        Query::table("products").where_eq("id", 1).max(&db.conn, "price").unwrap(),
        Some(15.0)
    );

    let failed: lucid::Result<()> = transaction(&db.conn, |conn: &dyn Connection| {
        Query::table("products").where_eq("id", 2).delete(conn)?;
        Err(LucidError::InvalidArgument("abort".into()))
    });
    assert!(failed.is_err());
    assert_eq!(Query::table("products").count(&db.conn).unwrap(), 2);
}

#[test]
fn grouped_or_stays_scoped() {
    let db = TestDatabase::new();
    let published_by_ada_or_grace = Query::table("posts")
        .where_true("published")
        .where_group(|q| q.where_eq("user_id", 1).or_where("user_id", Op::Eq, 2));
    assert_eq!(
        published_by_ada_or_grace.to_sql().unwrap().sql,
        "SELECT * FROM `posts` WHERE `published` IS TRUE AND (`user_id` = ? OR `user_id` = ?)"
    );
    assert_eq!(published_by_ada_or_grace.count(&db.conn).unwrap(), 2);
}

#[test]
fn database_errors_carry_the_statement() {
    let db = TestDatabase::new();
    let err = Query::table("missing").all(&db.conn).unwrap_err();
    assert_eq!(err.db_kind(), Some(lucid::DbErrorKind::Syntax));
    assert!(err.to_string().contains("missing"));
}
