//! Built-in handler modules of the admin server.
//!
//! [`admin`] is the management surface under `/api/admin`: resource
//! generation, the dynamic-page registry, snapshot export/import. [`crud`]
//! carries the seeded core resources (`auth`, `users`, `config`, `media`),
//! the same contracts the scaffold writes into a managed project, so a
//! fresh instance answers on every core route before anything is generated.

pub mod admin;
pub mod crud;

pub use admin::admin_table;
pub use crud::core_tables;
