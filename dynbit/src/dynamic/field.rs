use crate::dynamic::inventory;
use crate::field::{Field, FieldDescriptor};
use crate::model::instance::Instance;
use crate::model::value::FieldValue;
use crate::storage::WriteCtx;
use crate::{debug, AppError};
use std::collections::BTreeSet;

/// Dynamic capability of a field: only meaningful when the descriptor carries a grammar.
impl Field {
    /// Concrete name of the variant for `variable_part`; a related instance stands for its pk.
    pub fn name_for(&self, variable_part: impl FieldValue) -> Result<String, AppError> {
        self.base_descriptor().name_for(&variable_part.to_field_value())
    }

    /// The instance bound variant for `variable_part`, materialized on first use.
    pub fn get_for(&self, variable_part: impl FieldValue) -> Result<Field, AppError> {
        let instance = self.instance().ok_or_else(|| {
            AppError::usage(format!("`get_for` can be used only on a field bound to an instance, `{}` is not", self.name()))
        })?;
        let name = self.name_for(variable_part)?;
        instance.get_field(&name)
    }

    pub fn dynamic_part(&self) -> Result<&str, AppError> {
        self.descriptor().dynamic_part()
    }

    /// Variable parts recorded for this base (or this variant's base) on the bound instance.
    pub fn inventory(&self) -> Result<BTreeSet<String>, AppError> {
        if !self.descriptor().is_dynamic() {
            return Err(AppError::usage(format!("field `{}` of `{}` is not a dynamic field", self.name(), self.model().name())));
        }
        let instance = self.bound_instance()?;
        let key = instance.field_key(self.base_descriptor().name());
        self.model().storage().read(|ctx| inventory::members(ctx, &key))
    }

    fn base_descriptor(&self) -> &FieldDescriptor {
        match self.descriptor().dynamic_version_of() {
            Some(base) => base.as_ref(),
            None => self.descriptor().as_ref(),
        }
    }

    /// Materializes every inventoried variant, deletes its storage, then drops the inventory.
    pub(crate) fn delete_variants(&self, ctx: &mut WriteCtx<'_>, instance: &Instance) -> Result<(), AppError> {
        let key = instance.field_key(self.name());
        let parts = inventory::members(ctx, &key)?;
        for part in &parts {
            let variant = instance.get_field(&self.descriptor().name_for(part)?)?;
            variant.apply(ctx, variant.kind().delete_command())?;
        }
        inventory::clear(ctx, &key)?;
        debug!("Deleted {} variants of `{}` on {}:{}", parts.len(), self.name(), instance.model().name(), instance.pk());
        Ok(())
    }
}
