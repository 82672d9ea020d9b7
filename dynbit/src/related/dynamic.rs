use crate::model::instance::Instance;
use crate::model::value::FieldValue;
use crate::model::Model;
use crate::related::ReverseCollection;
use crate::AppError;
use std::collections::BTreeSet;

/// Reverse side of a dynamic relation field: one reverse collection per variable part.
#[derive(Clone)]
pub struct DynamicReverseCollection {
    origin: Instance,
    forward: Model,
    base_field: String,
}

impl std::fmt::Debug for DynamicReverseCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicReverseCollection")
            .field("origin", &self.origin)
            .field("forward", &self.forward.name())
            .field("base_field", &self.base_field)
            .finish()
    }
}

impl DynamicReverseCollection {
    pub(crate) fn for_instance(origin: &Instance, related_name: &str) -> Result<DynamicReverseCollection, AppError> {
        let model = origin.model();
        let reverse_ref = model.registry().reverse(model.name(), related_name)?.ok_or_else(|| {
            AppError::NoSuchField(format!("`{}` has no reverse collection `{}`", model.name(), related_name))
        })?;
        if !reverse_ref.dynamic {
            return Err(AppError::usage(format!(
                "`{}` is the reverse of the plain field `{}.{}`, use `reverse`",
                related_name, reverse_ref.forward_model, reverse_ref.field
            )));
        }
        Ok(DynamicReverseCollection {
            origin: origin.clone(),
            forward: model.db().model(&reverse_ref.forward_model)?,
            base_field: reverse_ref.field,
        })
    }

    pub fn base_field(&self) -> &str {
        &self.base_field
    }

    /// The reverse collection of the variant for `variable_part`, materialized if needed.
    pub fn for_part(&self, variable_part: impl FieldValue) -> Result<ReverseCollection, AppError> {
        let name = self.forward.field_name_for(&self.base_field, variable_part)?;
        ReverseCollection::for_field(&self.origin, self.forward.clone(), &name)
    }

    /// Forward instances whose variant for `variable_part` points at the origin and
    /// matching every `extra` filter.
    pub fn call(&self, variable_part: impl FieldValue, extra: &[(&str, &str)]) -> Result<BTreeSet<String>, AppError> {
        self.for_part(variable_part)?.filter(extra)
    }
}
