//! Bundled Plugins
//!
//! - [`builtin`]: path-based catalog over any INode stack, always present
//! - [`memory`]: in-memory namespace, user/group db and pool table
//! - [`filesystem`]: token-issuing disk pool driver and local IO
//! - [`profiler`]: timing decorators
//! - [`librarian`]: replica exclusion decorator

pub mod builtin;
pub mod filesystem;
pub mod librarian;
pub mod memory;
pub mod profiler;

use crate::registry::PluginLoader;
use std::collections::BTreeMap;

/// Plugins loadable by id
pub fn catalogue() -> BTreeMap<String, PluginLoader> {
    let mut plugins: BTreeMap<String, PluginLoader> = BTreeMap::new();
    plugins.insert(memory::PLUGIN_ID.to_string(), memory::register);
    plugins.insert(filesystem::PLUGIN_ID.to_string(), filesystem::register);
    plugins.insert(profiler::PLUGIN_ID.to_string(), profiler::register);
    plugins.insert(librarian::PLUGIN_ID.to_string(), librarian::register);
    plugins
}
