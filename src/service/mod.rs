pub mod crud;
pub mod hooks;

pub use crud::ResourceRouter;
pub use hooks::{NoHooks, OwnerScope, ResourceHooks};
