//! Spool-file handling: MO pickup (component G) and MT delivery (component H).
pub mod mo;
pub mod mt;
