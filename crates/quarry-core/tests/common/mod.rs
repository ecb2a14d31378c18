use quarry_core::{Engine, FieldSpec, Model, ModelDefinition, RelationshipOptions};

/// Engine over a fresh in-memory driver
#[allow(dead_code)]
pub fn engine() -> Engine {
    Engine::in_memory()
}

/// `users(name, email, age, active)`
#[allow(dead_code)]
pub fn define_users(engine: &Engine) -> Model {
    engine
        .define_model(
            ModelDefinition::new("users")
                .field("name", "")
                .field("email", "")
                .field("age", 0)
                .field("active", true),
        )
        .unwrap()
}

/// Blog schema: users have many posts (dependent), posts belong to users
/// and count themselves into `postcount`, posts have many tags through
/// taggings, users have one profile.
#[allow(dead_code)]
pub struct Blog {
    pub engine: Engine,
    pub users: Model,
    pub posts: Model,
    pub tags: Model,
    pub taggings: Model,
    pub profiles: Model,
}

#[allow(dead_code)]
pub fn blog() -> Blog {
    let engine = engine();
    let users = engine
        .define_model(
            ModelDefinition::new("users")
                .field("name", "")
                .field("postcount", 0),
        )
        .unwrap();
    let posts = engine
        .define_model(
            ModelDefinition::new("posts")
                .field("title", "")
                .field("user_id", FieldSpec::typed("INT"))
                .field("created", FieldSpec::typed("DATETIME"))
                .field("updated", FieldSpec::typed("DATETIME")),
        )
        .unwrap();
    let tags = engine
        .define_model(ModelDefinition::new("tags").field("label", ""))
        .unwrap();
    let taggings = engine
        .define_model(
            ModelDefinition::new("taggings")
                .field("post_id", FieldSpec::typed("INT"))
                .field("tag_id", FieldSpec::typed("INT")),
        )
        .unwrap();
    let profiles = engine
        .define_model(
            ModelDefinition::new("profiles")
                .field("bio", "")
                .field("user_id", FieldSpec::typed("INT")),
        )
        .unwrap();

    users
        .has_many("posts", RelationshipOptions::new().dependent().order("id DESC"))
        .unwrap();
    users
        .has_one("profile", RelationshipOptions::new().dependent())
        .unwrap();
    posts
        .belongs_to("user", RelationshipOptions::new().counter("postcount"))
        .unwrap();
    posts
        .has_many("taggings", RelationshipOptions::new().dependent())
        .unwrap();
    posts
        .has_many("tags", RelationshipOptions::new().through("taggings"))
        .unwrap();
    taggings.belongs_to("tag", RelationshipOptions::new()).unwrap();
    taggings.belongs_to("post", RelationshipOptions::new()).unwrap();

    Blog {
        engine,
        users,
        posts,
        tags,
        taggings,
        profiles,
    }
}
