use crate::dynamic::grammar::NameGrammar;
use crate::field::kind::FieldKind;
use crate::field::{FieldDescriptor, Relation};
use crate::model::ModelDef;
use crate::AppError;
use std::sync::Arc;

/// Marker for a relation pointing at the declaring model.
pub const SELF: &str = "self";

/// Declaration of one field, turned into a [`FieldDescriptor`] for every model that owns it.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    name: String,
    kind: FieldKind,
    indexable: bool,
    dynamic: bool,
    pattern: Option<String>,
    format: Option<String>,
    related: Option<String>,
    related_name: Option<String>,
}

impl FieldDecl {
    fn plain(name: &str, kind: FieldKind) -> FieldDecl {
        FieldDecl {
            name: name.to_string(),
            kind,
            indexable: false,
            dynamic: false,
            pattern: None,
            format: None,
            related: None,
            related_name: None,
        }
    }

    fn relation(name: &str, kind: FieldKind, related: &str) -> FieldDecl {
        FieldDecl { indexable: true, related: Some(related.to_string()), ..FieldDecl::plain(name, kind) }
    }

    pub fn string(name: &str) -> FieldDecl {
        FieldDecl::plain(name, FieldKind::String)
    }

    pub fn instance_hash(name: &str) -> FieldDecl {
        FieldDecl::plain(name, FieldKind::InstanceHash)
    }

    pub fn hash(name: &str) -> FieldDecl {
        FieldDecl::plain(name, FieldKind::Hash)
    }

    pub fn set(name: &str) -> FieldDecl {
        FieldDecl::plain(name, FieldKind::Set)
    }

    pub fn list(name: &str) -> FieldDecl {
        FieldDecl::plain(name, FieldKind::List)
    }

    pub fn sorted_set(name: &str) -> FieldDecl {
        FieldDecl::plain(name, FieldKind::SortedSet)
    }

    /// Foreign key stored as a plain string value.
    pub fn fk_string(name: &str, related: &str) -> FieldDecl {
        FieldDecl::relation(name, FieldKind::String, related)
    }

    /// Foreign key stored in a slot of the instance hash.
    pub fn fk_instance_hash(name: &str, related: &str) -> FieldDecl {
        FieldDecl::relation(name, FieldKind::InstanceHash, related)
    }

    pub fn m2m_set(name: &str, related: &str) -> FieldDecl {
        FieldDecl::relation(name, FieldKind::Set, related)
    }

    pub fn m2m_list(name: &str, related: &str) -> FieldDecl {
        FieldDecl::relation(name, FieldKind::List, related)
    }

    pub fn m2m_sorted_set(name: &str, related: &str) -> FieldDecl {
        FieldDecl::relation(name, FieldKind::SortedSet, related)
    }

    pub fn indexable(mut self) -> FieldDecl {
        self.indexable = true;
        self
    }

    pub fn dynamic(mut self) -> FieldDecl {
        self.dynamic = true;
        self
    }

    /// Recognizer of variant names; implies [`FieldDecl::dynamic`].
    pub fn pattern(mut self, pattern: &str) -> FieldDecl {
        self.dynamic = true;
        self.pattern = Some(pattern.to_string());
        self
    }

    /// Variant name template with `%s` for the variable part; implies [`FieldDecl::dynamic`].
    pub fn format(mut self, format: &str) -> FieldDecl {
        self.dynamic = true;
        self.format = Some(format.to_string());
        self
    }

    /// Name of the reverse collection on the related model. `%(model)s` and
    /// `%(namespace)s` are replaced by the declaring model's name and namespace.
    pub fn related_name(mut self, related_name: &str) -> FieldDecl {
        self.related_name = Some(related_name.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub(crate) fn descriptor(&self, model: &str, namespace: &str) -> Result<FieldDescriptor, AppError> {
        let grammar = if self.dynamic {
            Some(Arc::new(NameGrammar::new(&self.name, self.pattern.as_deref(), self.format.as_deref())?))
        } else {
            None
        };
        let relation = self.related.as_ref().map(|related| {
            let related_model = if related == SELF { model.to_string() } else { related.clone() };
            let template = self.related_name.clone().unwrap_or_else(|| format!("{}_set", model.to_lowercase()));
            let related_name = template
                .replace("%(model)s", &model.to_lowercase())
                .replace("%(namespace)s", &namespace.to_lowercase());
            Relation { related_model, related_name }
        });
        Ok(FieldDescriptor::new(&self.name, model, self.kind, self.indexable, grammar, relation))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkSpec {
    pub name: String,
    /// Keys are generated from a per model counter and cannot be passed at creation.
    pub auto: bool,
}

impl Default for PkSpec {
    fn default() -> Self {
        PkSpec { name: "pk".to_string(), auto: true }
    }
}

/// Declaration of a model; namespace, primary key, dynamic capability and fields are
/// inherited from the parent named by [`ModelBuilder::extends`].
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    name: String,
    namespace: Option<String>,
    pk: Option<PkSpec>,
    dynamic: bool,
    parent: Option<String>,
    is_abstract: bool,
    fields: Vec<FieldDecl>,
}

impl ModelBuilder {
    pub fn new(name: &str) -> ModelBuilder {
        ModelBuilder {
            name: name.to_string(),
            namespace: None,
            pk: None,
            dynamic: false,
            parent: None,
            is_abstract: false,
            fields: Vec::new(),
        }
    }

    pub fn namespace(mut self, namespace: &str) -> ModelBuilder {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Explicit primary key named `name`, required at creation.
    pub fn pk(mut self, name: &str) -> ModelBuilder {
        self.pk = Some(PkSpec { name: name.to_string(), auto: false });
        self
    }

    pub fn auto_pk(mut self) -> ModelBuilder {
        self.pk = Some(PkSpec::default());
        self
    }

    pub fn with_dynamic_fields(mut self) -> ModelBuilder {
        self.dynamic = true;
        self
    }

    pub fn extends(mut self, parent: &str) -> ModelBuilder {
        self.parent = Some(parent.to_string());
        self
    }

    pub fn abstract_model(mut self) -> ModelBuilder {
        self.is_abstract = true;
        self
    }

    pub fn field(mut self, field: FieldDecl) -> ModelBuilder {
        self.fields.push(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub(crate) fn build(self, parent: Option<&ModelDef>) -> Result<ModelDef, AppError> {
        let namespace = self.namespace.or_else(|| parent.map(|p| p.namespace().to_string())).unwrap_or_default();
        let pk = self.pk.or_else(|| parent.map(|p| p.pk().clone())).unwrap_or_default();
        let dynamic = self.dynamic || parent.is_some_and(|p| p.is_dynamic());

        let mut decls: Vec<FieldDecl> = parent.map(|p| p.decls().to_vec()).unwrap_or_default();
        for decl in self.fields {
            if decl.name == pk.name || decls.iter().any(|d| d.name == decl.name) {
                return Err(AppError::configuration(format!("field `{}` is declared twice on model `{}`", decl.name, self.name)));
            }
            decls.push(decl);
        }

        let mut fields = Vec::with_capacity(decls.len());
        for decl in &decls {
            if decl.dynamic && !dynamic {
                return Err(AppError::configuration(format!(
                    "model `{}` does not support dynamic fields, so the dynamic field `{}` cannot be attached to it",
                    self.name, decl.name
                )));
            }
            if decl.related.is_some() && decl.kind == FieldKind::Hash {
                return Err(AppError::configuration(format!("relation field `{}` cannot be a hash", decl.name)));
            }
            fields.push(Arc::new(decl.descriptor(&self.name, &namespace)?));
        }

        Ok(ModelDef::new(self.name, namespace, pk, self.parent, dynamic, self.is_abstract, fields, decls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_field_requires_dynamic_model() {
        let err = ModelBuilder::new("Broken").field(FieldDecl::set("test_field").dynamic()).build(None).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn related_name_defaults_and_placeholders() {
        let def = ModelBuilder::new("Group")
            .namespace("Related")
            .field(FieldDecl::m2m_set("members", "Person"))
            .field(FieldDecl::fk_instance_hash("parent", SELF).related_name("%(namespace)s_%(model)s_children"))
            .build(None)
            .unwrap();
        let members = def.field("members").unwrap().relation().unwrap().clone();
        assert_eq!(members, Relation { related_model: "Person".into(), related_name: "group_set".into() });
        let parent = def.field("parent").unwrap().relation().unwrap().clone();
        assert_eq!(parent, Relation { related_model: "Group".into(), related_name: "related_group_children".into() });
        assert!(def.field("parent").unwrap().is_indexable());
    }

    #[test]
    fn subclass_inherits_fields_with_own_descriptors() {
        let parent = ModelBuilder::new("Base").with_dynamic_fields().pk("name").field(FieldDecl::set("tags").dynamic()).build(None).unwrap();
        let child = ModelBuilder::new("Child").extends("Base").field(FieldDecl::string("title")).build(Some(&parent)).unwrap();
        assert!(child.is_dynamic());
        assert_eq!(child.pk().name, "name");
        assert_eq!(child.field_names().as_slice(), &["tags".to_string(), "title".to_string()]);
        assert_ne!(child.field("tags").unwrap().id(), parent.field("tags").unwrap().id());
        assert_eq!(child.field("tags").unwrap().model(), "Child");
    }

    #[test]
    fn invalid_pattern_is_reported_at_build() {
        let err = ModelBuilder::new("Broken").with_dynamic_fields().field(FieldDecl::set("f").pattern("^(f_$")).build(None).unwrap_err();
        assert!(err.is_configuration());
    }
}
