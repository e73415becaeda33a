//! Declarative plugin bindings.

/// Declare a group of typed slots bound from one plugin module.
///
/// Generates a struct with one `Arc<FunctionSlot<_>>` field per export and an
/// implementation of [`PluginBindings`](crate::registry::PluginBindings), so
/// the group can be handed to a [`RegistryBuilder`](crate::registry::RegistryBuilder).
/// The exported symbol defaults to the field name; `= "symbol"` overrides it.
///
/// # Example
///
/// ```rust
/// use hotbind_core::declare_plugin;
///
/// #[repr(C)]
/// #[derive(Debug, Clone, Copy)]
/// pub struct Vector2 {
///     pub x: f32,
///     pub y: f32,
/// }
///
/// #[repr(C)]
/// #[derive(Debug, Clone, Copy)]
/// pub struct Color32 {
///     pub r: u8,
///     pub g: u8,
///     pub b: u8,
///     pub a: u8,
/// }
///
/// declare_plugin! {
///     pub struct GeoBindings for "geo" {
///         get_position: unsafe extern "C" fn(f32, f32, f32) -> Vector2,
///         color: unsafe extern "C" fn() -> Color32 = "get_color",
///     }
/// }
///
/// let geo = GeoBindings::new();
/// assert_eq!(GeoBindings::PLUGIN_NAME, "geo");
/// assert_eq!(geo.color.symbol_name(), "get_color");
/// assert!(!geo.is_complete());
/// ```
#[macro_export]
macro_rules! declare_plugin {
    (@symbol $field:ident $symbol:literal) => {
        $symbol
    };
    (@symbol $field:ident) => {
        stringify!($field)
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident for $plugin:literal {
            $(
                $(#[$field_meta:meta])*
                $field:ident : $fn_ty:ty $(= $symbol:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field: ::std::sync::Arc<$crate::registry::FunctionSlot<$fn_ty>>,
            )*
        }

        impl $name {
            /// Logical name of the module these slots are bound from.
            pub const PLUGIN_NAME: &'static str = $plugin;

            pub fn new() -> Self {
                Self {
                    $(
                        $field: ::std::sync::Arc::new($crate::registry::FunctionSlot::new(
                            $crate::declare_plugin!(@symbol $field $($symbol)?),
                        )),
                    )*
                }
            }

            /// True when every slot in the group is bound.
            ///
            /// Stricter than `PluginLoader::is_available`, which only needs
            /// one bound slot.
            pub fn is_complete(&self) -> bool {
                true $(&& self.$field.is_bound())*
            }
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $crate::registry::PluginBindings for $name {
            fn descriptor(&self) -> $crate::registry::PluginDescriptor {
                $crate::registry::PluginDescriptor::new($plugin)
                    $(.with_slot(::std::sync::Arc::clone(&self.$field)))*
            }
        }
    };
}
