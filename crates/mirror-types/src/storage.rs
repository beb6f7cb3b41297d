//! Storage namespaces used by the catalog.

/// Namespaces of the catalog key-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Product rows keyed by catalog id.
	Products,
	/// Order rows keyed by catalog id.
	Orders,
	/// Id counters keyed by namespace name.
	Sequences,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Products => "products",
			StorageKey::Orders => "orders",
			StorageKey::Sequences => "sequences",
		}
	}
}
