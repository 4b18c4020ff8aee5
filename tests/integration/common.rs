//! Shared schema, models and seed data.

use lucid::connection::sqlite::SqliteConnection;
use lucid::{record, Builder, ModelDef, Query, Registry};
use std::sync::Arc;

const SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT
    );
    CREATE TABLE posts (
        id INTEGER PRIMARY KEY,
        user_id INTEGER,
        title TEXT NOT NULL,
        published INTEGER NOT NULL DEFAULT 0,
        meta TEXT,
        created_at TEXT,
        updated_at TEXT
    );
    CREATE TABLE comments (
        id INTEGER PRIMARY KEY,
        post_id INTEGER NOT NULL,
        body TEXT NOT NULL
    );
    CREATE TABLE videos (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL
    );
    CREATE TABLE tags (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE taggables (
        tag_id INTEGER NOT NULL,
        taggable_id INTEGER NOT NULL,
        taggable_type TEXT NOT NULL
    );
    CREATE TABLE images (
        id INTEGER PRIMARY KEY,
        imageable_id INTEGER NOT NULL,
        imageable_type TEXT NOT NULL,
        url TEXT NOT NULL
    );
    CREATE TABLE products (
        id INTEGER PRIMARY KEY,
        color TEXT,
        price REAL
    );
";

pub struct TestDatabase {
    pub conn: SqliteConnection,
    pub registry: Arc<Registry>,
}

impl TestDatabase {
    /// Schema plus seed rows:
    ///
    /// - users 1 (ada) and 2 (grace)
    /// - posts 1 and 2 by ada, post 3 by grace
    /// - comments 1 and 2 on post 1, comment 3 on post 2
    /// - video 1, sharing its id with post 1
    pub fn new() -> Self {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        let db = Self {
            conn,
            registry: registry(),
        };
        db.seed();
        db.conn.enable_query_log();
        db
    }

    fn seed(&self) {
        let users = Query::table("users");
        users
            .bulk_insert(
                &self.conn,
                vec![
                    record! { "id" => 1, "name" => "ada", "email" => "ada@example.com" },
                    record! { "id" => 2, "name" => "grace", "email" => "grace@example.com" },
                ],
            )
            .unwrap();
        Query::table("posts")
            .bulk_insert(
                &self.conn,
                vec![
                    record! { "id" => 1, "user_id" => 1, "title" => "first", "published" => 1,
                              "created_at" => "2024-12-05 10:00:00" },
                    record! { "id" => 2, "user_id" => 1, "title" => "second", "published" => 0,
                              "created_at" => "2024-11-20 08:30:00" },
                    record! { "id" => 3, "user_id" => 2, "title" => "third", "published" => 1,
                              "created_at" => "2024-12-24 18:00:00" },
                ],
            )
            .unwrap();
        Query::table("comments")
            .bulk_insert(
                &self.conn,
                vec![
                    record! { "id" => 1, "post_id" => 1, "body" => "nice" },
                    record! { "id" => 2, "post_id" => 1, "body" => "agreed" },
                    record! { "id" => 3, "post_id" => 2, "body" => "hmm" },
                ],
            )
            .unwrap();
        Query::table("videos")
            .insert(&self.conn, record! { "id" => 1, "title" => "intro" })
            .unwrap();
        Query::table("tags")
            .bulk_insert(
                &self.conn,
                vec![
                    record! { "id" => 1, "name" => "rust" },
                    record! { "id" => 2, "name" => "sql" },
                    record! { "id" => 3, "name" => "orm" },
                ],
            )
            .unwrap();
        Query::table("images")
            .bulk_insert(
                &self.conn,
                vec![
                    record! { "id" => 1, "imageable_id" => 1, "imageable_type" => "posts",
                              "url" => "/post.png" },
                    record! { "id" => 2, "imageable_id" => 1, "imageable_type" => "videos",
                              "url" => "/video.png" },
                ],
            )
            .unwrap();
    }

    pub fn builder(&self, model: &str) -> Builder {
        Builder::new(&self.registry, model).unwrap()
    }

    /// Statements run since the last call
    pub fn take_queries(&self) -> Vec<String> {
        let statements = self
            .conn
            .query_log()
            .into_iter()
            .map(|(sql, _)| sql)
            .collect();
        self.conn.clear_query_log();
        statements
    }
}

fn registry() -> Arc<Registry> {
    Registry::new()
        .register(
            ModelDef::new("User", "users")
                .hidden(["email"])
                .has_many("posts", "Post", "user_id")
                .has_many_through("comments", "Comment", "Post", "user_id", "post_id"),
        )
        .unwrap()
        .register(
            ModelDef::new("Post", "posts")
                .timestamps()
                .cast("published", "boolean")
                .cast("meta", "json")
                .belongs_to("author", "User", "user_id")
                .has_many("comments", "Comment", "post_id")
                .morph_to_many("tags", "Tag", "taggables", "taggable", "tag_id")
                .morph_many("images", "Image", "imageable"),
        )
        .unwrap()
        .register(
            ModelDef::new("Video", "videos")
                .morph_to_many("tags", "Tag", "taggables", "taggable", "tag_id")
                .morph_many("images", "Image", "imageable"),
        )
        .unwrap()
        .register(
            ModelDef::new("Tag", "tags")
                .morphed_by_many("posts", "Post", "taggables", "taggable", "tag_id")
                .morphed_by_many("videos", "Video", "taggables", "taggable", "tag_id"),
        )
        .unwrap()
        .register(ModelDef::new("Comment", "comments").belongs_to("post", "Post", "post_id"))
        .unwrap()
        .register(ModelDef::new("Image", "images").morph_to("imageable"))
        .unwrap()
        .register(ModelDef::new("Product", "products").cast("price", "float"))
        .unwrap()
        .into_shared()
}
