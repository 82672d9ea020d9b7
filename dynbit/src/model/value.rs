use crate::model::instance::Instance;

/// Conversion of a caller value into the string stored by a field.
///
/// An [`Instance`] converts to its primary key, so related instances can be passed
/// wherever a primary key is expected.
pub trait FieldValue {
    fn to_field_value(&self) -> String;
}

impl FieldValue for str {
    fn to_field_value(&self) -> String {
        self.to_string()
    }
}

impl FieldValue for String {
    fn to_field_value(&self) -> String {
        self.clone()
    }
}

impl<T: FieldValue + ?Sized> FieldValue for &T {
    fn to_field_value(&self) -> String {
        (**self).to_field_value()
    }
}

impl FieldValue for Instance {
    fn to_field_value(&self) -> String {
        self.pk().to_string()
    }
}

macro_rules! display_field_value {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                fn to_field_value(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

display_field_value!(i32, i64, u32, u64, usize);
