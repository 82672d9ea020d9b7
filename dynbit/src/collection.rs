//! Equality queries over indexed fields.
//!
//! Filter names are `field`, `field__subkey` for hash fields, optionally followed by the
//! index name `__eq`. `pk` and the model's pk name filter on the primary key itself.

use crate::field::kind::FieldKind;
use crate::model::instance::Instance;
use crate::model::value::FieldValue;
use crate::model::Model;
use crate::storage::KeyRead;
use crate::AppError;
use std::collections::BTreeSet;

const SEPARATOR: &str = "__";
const EQ_INDEX: &str = "eq";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Filter {
    Pk(String),
    Index { filter: String, value: String },
}

#[derive(Clone)]
pub struct Collection {
    model: Model,
    filters: Vec<Filter>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("model", &self.model.name())
            .field("filters", &self.filters)
            .finish()
    }
}

impl Collection {
    pub(crate) fn new(model: Model) -> Collection {
        Collection { model, filters: Vec::new() }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn filter(mut self, name: &str, value: impl FieldValue) -> Result<Collection, AppError> {
        let filter = self.parse(name, value.to_field_value())?;
        self.filters.push(filter);
        Ok(self)
    }

    pub fn filters(self, filters: &[(&str, &str)]) -> Result<Collection, AppError> {
        filters.iter().try_fold(self, |collection, (name, value)| collection.filter(name, *value))
    }

    /// Filter on the variant of dynamic field `field` for `variable_part`.
    pub fn dynamic_filter(self, field: &str, variable_part: impl FieldValue, value: impl FieldValue) -> Result<Collection, AppError> {
        self.dynamic_filter_with_index(field, variable_part, value, "")
    }

    /// Only the first `__` segment of `field` names the dynamic base, so `tags__key` works
    /// for dynamic hash fields. A non empty `index_suffix` is appended as the last segment.
    pub fn dynamic_filter_with_index(
        self,
        field: &str,
        variable_part: impl FieldValue,
        value: impl FieldValue,
        index_suffix: &str,
    ) -> Result<Collection, AppError> {
        let mut segments: Vec<String> = field.split(SEPARATOR).map(str::to_string).collect();
        segments[0] = self.model.field_name_for(&segments[0], variable_part)?;
        if !index_suffix.is_empty() {
            segments.push(index_suffix.to_string());
        }
        self.filter(&segments.join(SEPARATOR), value)
    }

    fn parse(&self, name: &str, value: String) -> Result<Filter, AppError> {
        let segments: Vec<&str> = name.split(SEPARATOR).collect();
        let (head, rest) = (segments[0], &segments[1..]);

        if head == "pk" || head == self.model.def().pk().name {
            check_index(name, rest)?;
            return Ok(Filter::Pk(value));
        }

        let field = self.model.get_field(head)?;
        let descriptor = field.descriptor();
        if descriptor.is_dynamic_base() {
            return Err(AppError::usage(format!("`{}` is a dynamic field, filter on one of its variants with `dynamic_filter`", head)));
        }
        if !descriptor.is_indexable() {
            return Err(AppError::usage(format!("field `{}` of `{}` is not indexable", head, self.model.name())));
        }
        let filter = match descriptor.kind() {
            FieldKind::Hash => {
                let Some((subkey, rest)) = rest.split_first() else {
                    return Err(AppError::usage(format!("filter on hash field `{}` needs a key: `{}__<key>`", head, head)));
                };
                check_index(name, rest)?;
                format!("{}{}{}", head, SEPARATOR, subkey)
            }
            _ => {
                check_index(name, rest)?;
                head.to_string()
            }
        };
        Ok(Filter::Index { filter, value })
    }

    pub(crate) fn pks_in(&self, ctx: &dyn KeyRead) -> Result<BTreeSet<String>, AppError> {
        let mut pks = self.model.pks_in(ctx)?;
        let scope = self.model.scope();
        for filter in &self.filters {
            let matching = match filter {
                Filter::Pk(pk) => BTreeSet::from([pk.clone()]),
                Filter::Index { filter, value } => ctx.indexed(&scope, filter, value)?,
            };
            pks.retain(|pk| matching.contains(pk));
            if pks.is_empty() {
                break;
            }
        }
        Ok(pks)
    }

    /// Primary keys matching every filter; without filters, every primary key of the model.
    pub fn pks(&self) -> Result<BTreeSet<String>, AppError> {
        self.model.storage().read(|ctx| self.pks_in(ctx))
    }

    pub fn instances(&self) -> Result<Vec<Instance>, AppError> {
        Ok(self.pks()?.into_iter().map(|pk| self.model.bind(pk)).collect())
    }
}

fn check_index(name: &str, rest: &[&str]) -> Result<(), AppError> {
    match rest {
        [] => Ok(()),
        [index] if *index == EQ_INDEX => Ok(()),
        _ => Err(AppError::usage(format!("unsupported filter `{}`, only equality (`{}`) is indexed", name, EQ_INDEX))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_equality_index_is_accepted() {
        assert!(check_index("tags", &[]).is_ok());
        assert!(check_index("tags__eq", &["eq"]).is_ok());
        assert!(check_index("tags__gt", &["gt"]).unwrap_err().is_usage());
        assert!(check_index("tags__eq__eq", &["eq", "eq"]).unwrap_err().is_usage());
    }
}
