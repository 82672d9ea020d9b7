use dynbit::*;
use std::collections::BTreeSet;

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn db(models: Vec<ModelBuilder>) -> Db {
    let registry = models.into_iter().fold(Registry::builder(), |builder, model| builder.model(model)).build().unwrap();
    Db::new(Storage::in_memory("test").unwrap(), registry)
}

fn dynamic_model(name: &str, field: FieldDecl) -> ModelBuilder {
    ModelBuilder::new(name).namespace("fields-tests").with_dynamic_fields().field(field)
}

struct Movies {
    db: Db,
    fight_club: Instance,
    matrix: Instance,
    somebody: Instance,
}

fn movies() -> Movies {
    let db = db(vec![
        ModelBuilder::new("Person").namespace("fields-tests").pk("name"),
        ModelBuilder::new("Movie")
            .namespace("fields-tests")
            .with_dynamic_fields()
            .pk("name")
            .field(FieldDecl::set("tags").indexable())
            .field(FieldDecl::set("personal_tags").indexable().dynamic()),
    ]);
    let movie = db.model("Movie").unwrap();
    let fight_club = movie.create(&[("name", "Fight club")]).unwrap();
    fight_club.get_field("tags").unwrap().sadd(&["us", "drama", "brad pitt"]).unwrap();
    let matrix = movie.create(&[("name", "Matrix")]).unwrap();
    matrix.get_field("tags").unwrap().sadd(&["us", "action", "keanu reaves"]).unwrap();
    let somebody = db.model("Person").unwrap().create(&[("name", "Somebody")]).unwrap();
    Movies { db, fight_club, matrix, somebody }
}

#[test]
fn dynamic_field_must_be_in_a_dynamic_model() {
    let err = Registry::builder()
        .model(ModelBuilder::new("TestModel").field(FieldDecl::set("test_field").dynamic()))
        .build()
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn dynamic_field_name_must_match_pattern() {
    let db = db(vec![dynamic_model("TestModel", FieldDecl::set("test_field").pattern(r"^part_\d+$"))]);
    let instance = db.model("TestModel").unwrap().create(&[]).unwrap();
    assert_eq!(instance.get_field("part_1").unwrap().name(), "part_1");
    assert!(instance.get_field("part_two").unwrap_err().is_no_such_field());
    assert!(!instance.has_field("part_two").unwrap());
}

#[test]
fn pattern_without_capture_group_cannot_name_variants() {
    let db = db(vec![dynamic_model("TestModel", FieldDecl::set("test_field").pattern(r"^part_\d+$"))]);
    let instance = db.model("TestModel").unwrap().create(&[]).unwrap();
    let base = instance.get_field("test_field").unwrap();
    assert!(base.name_for("1").unwrap_err().is_configuration());
    assert!(instance.get_field("part_1").unwrap().sadd(&["x"]).unwrap_err().is_configuration());
}

#[test]
fn dynamic_field_names_are_computed_from_the_variable_part() {
    let m = movies();
    let movie = m.db.model("Movie").unwrap();

    let name = movie.field_name_for("personal_tags", &m.somebody).unwrap();
    assert_eq!(name, "personal_tags_Somebody");
    assert_eq!(m.fight_club.get_field(&name).unwrap().name(), name);
    let variant = m.matrix.get_for("personal_tags", "Somebody").unwrap();
    assert_eq!(variant.name(), name);
    assert_eq!(variant.dynamic_part().unwrap(), "Somebody");
    assert_eq!(variant.descriptor().dynamic_version_of().unwrap().name(), "personal_tags");
}

#[test]
fn variants_are_cached_per_class_and_per_instance() {
    let m = movies();
    let movie = m.db.model("Movie").unwrap();

    let class_variant = movie.get_field("personal_tags_Somebody").unwrap();
    assert_eq!(movie.get_field("personal_tags_Somebody").unwrap().descriptor().id(), class_variant.descriptor().id());

    let attached = m.fight_club.get_field("personal_tags_Somebody").unwrap();
    assert_ne!(attached.descriptor().id(), class_variant.descriptor().id());
    assert_eq!(m.fight_club.get_field("personal_tags_Somebody").unwrap().descriptor().id(), attached.descriptor().id());
    assert_ne!(m.matrix.get_field("personal_tags_Somebody").unwrap().descriptor().id(), attached.descriptor().id());

    assert!(m.fight_club.field_names().unwrap().contains(&"personal_tags_Somebody".to_string()));
    assert!(!movie.def().field_names().contains(&"personal_tags_Somebody".to_string()));
}

#[test]
fn has_field_does_not_materialize_variants() {
    let m = movies();
    let movie = m.db.model("Movie").unwrap();
    let names_before = m.fight_club.field_names().unwrap();

    assert!(m.fight_club.has_field("personal_tags_anything").unwrap());
    assert!(movie.has_field("personal_tags_anything").unwrap());
    assert!(m.fight_club.has_field("tags").unwrap());
    assert!(!m.fight_club.has_field("other_anything").unwrap());
    assert!(!movie.has_field("other_anything").unwrap());

    assert_eq!(m.fight_club.field_names().unwrap(), names_before);
    assert!(m.db.registry().class_variant("Movie", "personal_tags_anything").unwrap().is_none());

    m.fight_club.get_field("personal_tags_anything").unwrap();
    assert!(m.fight_club.has_field("personal_tags_anything").unwrap());
    assert!(m.db.registry().class_variant("Movie", "personal_tags_anything").unwrap().is_some());
}

#[test]
fn set_and_get_dynamic_field() {
    let m = movies();
    let fight_club_somebody = m.fight_club.get_for("personal_tags", &m.somebody).unwrap();
    fight_club_somebody.sadd(&["fight", "cool"]).unwrap();
    assert_eq!(fight_club_somebody.smembers().unwrap(), set(&["fight", "cool"]));

    let matrix_somebody = m.matrix.get_for("personal_tags", &m.somebody).unwrap();
    matrix_somebody.sadd(&["sf", "cool"]).unwrap();
    assert_eq!(matrix_somebody.smembers().unwrap(), set(&["sf", "cool"]));

    let someone_else = m.db.model("Person").unwrap().create(&[("name", "Someone Else")]).unwrap();
    let fight_club_someone_else = m.fight_club.get_for("personal_tags", &someone_else).unwrap();
    fight_club_someone_else.sadd(&["ikea", "revolution"]).unwrap();
    assert_eq!(fight_club_someone_else.smembers().unwrap(), set(&["ikea", "revolution"]));
    assert_eq!(fight_club_somebody.smembers().unwrap(), set(&["fight", "cool"]));
}

#[test]
fn model_could_handle_many_dynamic_fields() {
    let db = db(vec![ModelBuilder::new("TestModel")
        .with_dynamic_fields()
        .field(FieldDecl::string("foo").dynamic())
        .field(FieldDecl::string("bar").dynamic())]);
    let model = db.model("TestModel").unwrap();
    let instance = model.create(&[]).unwrap();
    for (name, value) in [("foo_1", "foo1"), ("foo_2", "foo2"), ("bar_1", "bar1"), ("bar_2", "bar2")] {
        instance.get_field(name).unwrap().set(value).unwrap();
    }

    let reloaded = model.get(instance.pk()).unwrap();
    assert_eq!(reloaded.get_field("foo_1").unwrap().get().unwrap().as_deref(), Some("foo1"));
    assert_eq!(reloaded.get_field("foo_2").unwrap().get().unwrap().as_deref(), Some("foo2"));
    assert_eq!(reloaded.get_field("bar_1").unwrap().get().unwrap().as_deref(), Some("bar1"));
    assert_eq!(reloaded.get_field("bar_2").unwrap().get().unwrap().as_deref(), Some("bar2"));
    assert_eq!(reloaded.get_field("foo_1").unwrap().descriptor().dynamic_version_of().unwrap().name(), "foo");
}

#[test]
fn dynamic_field_could_be_set_on_creation() {
    let db = db(vec![ModelBuilder::new("TestModel")
        .with_dynamic_fields()
        .field(FieldDecl::string("name"))
        .field(FieldDecl::string("test_field").dynamic())]);
    let model = db.model("TestModel").unwrap();
    let created = model.create(&[("name", "foo"), ("test_field_1", "foo 1"), ("test_field_2", "bar 2")]).unwrap();

    let instance = model.get(created.pk()).unwrap();
    assert_eq!(instance.get_field("name").unwrap().get().unwrap().as_deref(), Some("foo"));
    assert_eq!(instance.get_field("test_field_1").unwrap().get().unwrap().as_deref(), Some("foo 1"));
    assert_eq!(instance.get_field("test_field_2").unwrap().get().unwrap().as_deref(), Some("bar 2"));
    assert_eq!(instance.get_field("test_field").unwrap().inventory().unwrap(), set(&["1", "2"]));
}

#[test]
fn creation_with_unknown_field_leaves_nothing_behind() {
    let db = db(vec![dynamic_model("TestModel", FieldDecl::string("test_field"))]);
    let model = db.model("TestModel").unwrap();
    assert!(model.create(&[("test_field_1", "foo"), ("other", "bar")]).unwrap_err().is_no_such_field());
    assert!(model.collection().pks().unwrap().is_empty());
    assert_eq!(model.create(&[]).unwrap().pk(), "1");
}

#[test]
fn indexable_dynamic_fields_should_be_indexed() {
    let m = movies();
    let movie = m.db.model("Movie").unwrap();
    m.fight_club.get_for("personal_tags", &m.somebody).unwrap().sadd(&["fight", "cool"]).unwrap();
    m.matrix.get_for("personal_tags", &m.somebody).unwrap().sadd(&["sf", "cool"]).unwrap();
    let expected = set(&["Fight club", "Matrix"]);

    assert_eq!(movie.collection().filter("personal_tags_Somebody", "cool").unwrap().pks().unwrap(), expected);

    let name = movie.field_name_for("personal_tags", &m.somebody).unwrap();
    assert_eq!(movie.collection().filters(&[(name.as_str(), "cool")]).unwrap().pks().unwrap(), expected);

    let dynamic = movie.collection().dynamic_filter("personal_tags", &m.somebody, "cool").unwrap();
    assert_eq!(dynamic.pks().unwrap(), expected);
    let with_index = movie.collection().dynamic_filter_with_index("personal_tags", "Somebody", "sf", "eq").unwrap();
    assert_eq!(with_index.pks().unwrap(), set(&["Matrix"]));
}

#[test]
fn normal_filters_could_be_combined_with_dynamic_ones() {
    let m = movies();
    let movie = m.db.model("Movie").unwrap();
    m.fight_club.get_for("personal_tags", &m.somebody).unwrap().sadd(&["fight", "cool"]).unwrap();
    m.matrix.get_for("personal_tags", &m.somebody).unwrap().sadd(&["sf", "cool"]).unwrap();

    let personal_cool_drama = movie.collection().filter("tags", "drama").unwrap().dynamic_filter("personal_tags", &m.somebody, "cool").unwrap();
    assert_eq!(personal_cool_drama.pks().unwrap(), set(&["Fight club"]));
    let instances = personal_cool_drama.instances().unwrap();
    assert_eq!(instances, vec![m.fight_club.clone()]);
}

#[test]
fn unsupported_filters_are_rejected() {
    let m = movies();
    let movie = m.db.model("Movie").unwrap();
    assert!(movie.collection().filter("personal_tags", "cool").unwrap_err().is_usage());
    assert!(movie.collection().filter("tags__gt", "cool").unwrap_err().is_usage());
    assert!(movie.collection().filter("nothing", "cool").unwrap_err().is_no_such_field());
    assert_eq!(movie.collection().filter("pk", "Matrix").unwrap().pks().unwrap(), set(&["Matrix"]));
    assert_eq!(movie.collection().filter("name__eq", "Matrix").unwrap().pks().unwrap(), set(&["Matrix"]));
}

#[test]
fn dynamic_fields_should_work_for_strings() {
    let db = db(vec![dynamic_model("TestModel", FieldDecl::string("test_field").indexable().dynamic())]);
    let model = db.model("TestModel").unwrap();
    let instance = model.create(&[("test_field_1", "foo")]).unwrap();
    assert_eq!(model.collection().filter("test_field_1", "foo").unwrap().pks().unwrap(), set(&[instance.pk()]));
}

#[test]
fn dynamic_fields_should_work_for_instance_hashes() {
    let db = db(vec![dynamic_model("TestModel", FieldDecl::instance_hash("test_field").indexable().dynamic())]);
    let model = db.model("TestModel").unwrap();
    let instance = model.create(&[("test_field_1", "foo")]).unwrap();
    assert_eq!(model.collection().filter("test_field_1", "foo").unwrap().pks().unwrap(), set(&[instance.pk()]));

    assert_eq!(instance.hmget(&["test_field_1"]).unwrap(), vec![Some("foo".to_string())]);
    assert_eq!(instance.hmget(&["test_field_1", "test_field_2"]).unwrap(), vec![Some("foo".to_string()), None]);

    instance.get_field("test_field_2").unwrap().hset("bar").unwrap();
    assert_eq!(
        instance.hmget(&["test_field_1", "test_field_2"]).unwrap(),
        vec![Some("foo".to_string()), Some("bar".to_string())]
    );
    assert!(instance.hmget(&["test__field_1"]).unwrap_err().is_no_such_field());
    assert!(instance.hmget(&["test_field"]).unwrap_err().is_usage());
    assert!(instance.hash_field_names().unwrap().contains(&"test_field_2".to_string()));
}

#[test]
fn dynamic_fields_should_work_for_sets() {
    let db = db(vec![dynamic_model("TestModel", FieldDecl::set("test_field").indexable().dynamic())]);
    let model = db.model("TestModel").unwrap();
    let instance = model.create(&[]).unwrap();
    instance.get_field("test_field_1").unwrap().sadd(&["foo", "bar"]).unwrap();
    assert_eq!(model.collection().filter("test_field_1", "foo").unwrap().pks().unwrap(), set(&[instance.pk()]));
}

#[test]
fn dynamic_fields_should_work_for_lists() {
    let db = db(vec![dynamic_model("TestModel", FieldDecl::list("test_field").indexable().dynamic())]);
    let model = db.model("TestModel").unwrap();
    let instance = model.create(&[]).unwrap();
    instance.get_field("test_field_1").unwrap().lpush(&["foo", "bar"]).unwrap();
    assert_eq!(instance.get_field("test_field_1").unwrap().lrange(0, -1).unwrap(), vec!["bar".to_string(), "foo".to_string()]);
    assert_eq!(model.collection().filter("test_field_1", "foo").unwrap().pks().unwrap(), set(&[instance.pk()]));
}

#[test]
fn dynamic_fields_should_work_for_sorted_sets() {
    let db = db(vec![dynamic_model("TestModel", FieldDecl::sorted_set("test_field").indexable().dynamic())]);
    let model = db.model("TestModel").unwrap();
    let instance = model.create(&[]).unwrap();
    let field = instance.get_field("test_field_1").unwrap();
    field.zadd(&[(1.0, "foo"), (2.0, "bar")]).unwrap();
    assert_eq!(field.zrange_with_scores(0, -1).unwrap(), vec![("foo".to_string(), 1.0), ("bar".to_string(), 2.0)]);
    assert_eq!(model.collection().filter("test_field_1", "foo").unwrap().pks().unwrap(), set(&[instance.pk()]));
}

#[test]
fn dynamic_fields_should_work_for_hashes() {
    let db = db(vec![dynamic_model("TestModel", FieldDecl::hash("test_field").indexable().dynamic())]);
    let model = db.model("TestModel").unwrap();
    let instance = model.create(&[]).unwrap();
    instance.get_field("test_field_1").unwrap().hmset(&[("foo", "FOO"), ("bar", "BAR")]).unwrap();

    assert_eq!(instance.get_for("test_field", "1").unwrap().hget_key("foo").unwrap().as_deref(), Some("FOO"));
    assert_eq!(model.collection().filter("test_field_1__foo", "FOO").unwrap().pks().unwrap(), set(&[instance.pk()]));
    assert_eq!(model.collection().dynamic_filter("test_field__foo", "1", "FOO").unwrap().pks().unwrap(), set(&[instance.pk()]));
    assert!(model.collection().filter("test_field_1", "FOO").unwrap_err().is_usage());
}

#[test]
fn custom_format_and_pattern_round_trip() {
    let db = db(vec![dynamic_model(
        "TestModel",
        FieldDecl::sorted_set("score").pattern(r"^(.+)%_score$").format("%s%%_score").indexable(),
    )]);
    let model = db.model("TestModel").unwrap();
    let name = model.field_name_for("score", "math").unwrap();
    assert_eq!(name, "math%_score");
    let instance = model.create(&[]).unwrap();
    let variant = instance.get_field(&name).unwrap();
    assert_eq!(variant.dynamic_part().unwrap(), "math");
    assert!(model.field_name_for("score", "").unwrap_err().is_configuration());
}

#[test]
fn commands_on_a_base_or_unbound_field_are_rejected() {
    let m = movies();
    let movie = m.db.model("Movie").unwrap();
    let base = m.fight_club.get_field("personal_tags").unwrap();
    assert!(base.sadd(&["x"]).unwrap_err().is_configuration());
    assert!(base.dynamic_part().unwrap_err().is_usage());

    let unbound = movie.get_field("personal_tags_Somebody").unwrap();
    assert!(unbound.smembers().unwrap_err().is_usage());
    assert!(movie.get_field("personal_tags").unwrap().get_for("Somebody").unwrap_err().is_usage());
    assert!(m.fight_club.get_field("tags").unwrap().name_for("x").unwrap_err().is_usage());
    assert!(m.fight_club.get_field("tags").unwrap().lpush(&["x"]).unwrap_err().is_usage());
}

#[test]
fn inventory_exists_only_for_dynamic_fields() {
    let m = movies();
    let tags = m.fight_club.get_field("tags").unwrap();
    assert_eq!(tags.smembers().unwrap(), set(&["us", "drama", "brad pitt"]));
    assert!(tags.inventory().unwrap_err().is_usage());

    let personal_tags = m.fight_club.get_field("personal_tags").unwrap();
    personal_tags.get_for(&m.somebody).unwrap().sadd(&["fight"]).unwrap();
    assert_eq!(personal_tags.inventory().unwrap(), set(&["Somebody"]));
    assert_eq!(m.fight_club.get_for("personal_tags", "Somebody").unwrap().inventory().unwrap(), set(&["Somebody"]));
}

#[test]
fn inventory_should_be_filled_and_cleaned() {
    let m = movies();
    let someone_else = m.db.model("Person").unwrap().create(&[("name", "Someone Else")]).unwrap();
    let fight_club_tags = m.fight_club.get_field("personal_tags").unwrap();
    let matrix_tags = m.matrix.get_field("personal_tags").unwrap();

    assert!(fight_club_tags.inventory().unwrap().is_empty());
    assert!(matrix_tags.inventory().unwrap().is_empty());

    fight_club_tags.get_for(&m.somebody).unwrap().sadd(&["fight", "cool"]).unwrap();
    assert_eq!(fight_club_tags.inventory().unwrap(), set(&["Somebody"]));
    assert!(matrix_tags.inventory().unwrap().is_empty());

    fight_club_tags.get_for(&someone_else).unwrap().sadd(&["ikea", "revolution"]).unwrap();
    assert_eq!(fight_club_tags.inventory().unwrap(), set(&["Somebody", "Someone Else"]));

    matrix_tags.get_for(&m.somebody).unwrap().sadd(&["sf", "cool"]).unwrap();
    assert_eq!(matrix_tags.inventory().unwrap(), set(&["Somebody"]));

    matrix_tags.get_for(&m.somebody).unwrap().delete().unwrap();
    assert_eq!(fight_club_tags.inventory().unwrap(), set(&["Somebody", "Someone Else"]));
    assert!(matrix_tags.inventory().unwrap().is_empty());

    fight_club_tags.get_for(&someone_else).unwrap().delete().unwrap();
    assert_eq!(fight_club_tags.inventory().unwrap(), set(&["Somebody"]));

    fight_club_tags.get_for(&someone_else).unwrap().sadd(&["ikea", "revolution"]).unwrap();
    assert_eq!(fight_club_tags.inventory().unwrap(), set(&["Somebody", "Someone Else"]));

    fight_club_tags.delete().unwrap();
    assert!(fight_club_tags.inventory().unwrap().is_empty());
    assert!(matrix_tags.inventory().unwrap().is_empty());
    assert!(fight_club_tags.get_for(&m.somebody).unwrap().smembers().unwrap().is_empty());
    assert!(m.db.model("Movie").unwrap().collection().filter("personal_tags_Somebody", "cool").unwrap().pks().unwrap().is_empty());
}

#[test]
fn emptying_a_variant_without_delete_keeps_it_inventoried() {
    let m = movies();
    let tags = m.fight_club.get_for("personal_tags", &m.somebody).unwrap();
    tags.sadd(&["cool"]).unwrap();
    tags.srem(&["cool"]).unwrap();
    assert_eq!(m.fight_club.get_field("personal_tags").unwrap().inventory().unwrap(), set(&["Somebody"]));
    assert_eq!(tags.scard().unwrap(), 0);
}

#[test]
fn deleting_an_instance_deletes_its_variants() {
    let m = movies();
    m.fight_club.get_for("personal_tags", &m.somebody).unwrap().sadd(&["fight", "cool"]).unwrap();
    m.matrix.get_for("personal_tags", &m.somebody).unwrap().sadd(&["cool"]).unwrap();

    m.fight_club.delete().unwrap();

    let movie = m.db.model("Movie").unwrap();
    assert!(!movie.exists("Fight club").unwrap());
    assert_eq!(movie.collection().filter("personal_tags_Somebody", "cool").unwrap().pks().unwrap(), set(&["Matrix"]));
    assert!(movie.collection().filter("tags", "drama").unwrap().pks().unwrap().is_empty());
    assert!(m.fight_club.get_field("personal_tags").unwrap().inventory().unwrap().is_empty());
    assert!(movie.get("Fight club").unwrap_err().is_not_found());
}

#[test]
fn subclasses_share_materialized_variants() {
    let db = db(vec![
        ModelBuilder::new("Base").abstract_model().with_dynamic_fields().field(FieldDecl::set("tags").indexable().dynamic()),
        ModelBuilder::new("Movie").extends("Base"),
        ModelBuilder::new("Series").extends("Movie"),
    ]);
    let base = db.model("Base").unwrap();
    base.get_field("tags_fr").unwrap();

    let movie = db.model("Movie").unwrap();
    let series = db.model("Series").unwrap();
    let movie_variant = db.registry().class_variant("Movie", "tags_fr").unwrap().unwrap();
    let series_variant = db.registry().class_variant("Series", "tags_fr").unwrap().unwrap();
    assert_eq!(movie_variant.model(), "Movie");
    assert_eq!(series_variant.model(), "Series");
    assert_eq!(movie.get_field("tags_fr").unwrap().descriptor().id(), movie_variant.id());
    assert_ne!(movie_variant.id(), series_variant.id());

    assert!(base.create(&[]).unwrap_err().is_usage());
    let episode = series.create(&[("tags_fr", "policier")]).unwrap();
    assert_eq!(series.collection().filter("tags_fr", "policier").unwrap().pks().unwrap(), set(&[episode.pk()]));
    assert!(movie.collection().filter("tags_fr", "policier").unwrap().pks().unwrap().is_empty());
}

#[test]
fn primary_keys_are_checked_on_creation() {
    let m = movies();
    let movie = m.db.model("Movie").unwrap();
    assert!(movie.create(&[("name", "Matrix")]).unwrap_err().to_string().contains("Already exists"));
    assert!(movie.create(&[]).unwrap_err().is_usage());
    assert!(movie.create(&[("name", "collection")]).unwrap_err().is_usage());
}

#[test]
fn file_backed_storage_keeps_dynamic_values() {
    let registry = Registry::builder().model(dynamic_model("TestModel", FieldDecl::string("test_field").indexable().dynamic())).build().unwrap();
    let storage = Storage::temp("dynamic_fields", "test").unwrap();
    let path = storage.path().unwrap().to_path_buf();
    let db = Db::new(storage, registry);
    let model = db.model("TestModel").unwrap();
    let instance = model.create(&[("test_field_fr", "bonjour")]).unwrap();
    assert_eq!(instance.get_for("test_field", "fr").unwrap().get().unwrap().as_deref(), Some("bonjour"));
    drop(instance);
    drop(model);
    drop(db);
    std::fs::remove_file(path).unwrap();
}
