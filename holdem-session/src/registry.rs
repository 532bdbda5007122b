//! Player→table lookup.
//!
//! Spec §9 flags the source's player-table cyclic references as worth
//! dropping. Here a session never holds a `TableHandle` of its own inside a
//! `Player`-ish struct; it holds a `player_id` and asks this registry for
//! the table handle each time, and the registry is the only thing that
//! owns both directions of the mapping.

use dashmap::DashMap;
use holdem_core::table::actor::TableHandle;
use uuid::Uuid;

#[derive(Default)]
pub struct TableRegistry {
    tables: DashMap<Uuid, TableHandle>,
    bindings: DashMap<Uuid, Uuid>,
}

impl TableRegistry {
    pub fn new() -> Self {
        TableRegistry { tables: DashMap::new(), bindings: DashMap::new() }
    }

    pub fn register_table(&self, handle: TableHandle) {
        self.tables.insert(handle.table_id, handle);
    }

    pub fn remove_table(&self, table_id: Uuid) {
        self.tables.remove(&table_id);
        self.bindings.retain(|_, bound_table| *bound_table != table_id);
    }

    pub fn table(&self, table_id: Uuid) -> Option<TableHandle> {
        self.tables.get(&table_id).map(|entry| entry.clone())
    }

    /// Records that `player_id` currently has an open seat/session at
    /// `table_id`. Call on every successful `join_table`.
    pub fn bind_player(&self, player_id: Uuid, table_id: Uuid) {
        self.bindings.insert(player_id, table_id);
    }

    pub fn unbind_player(&self, player_id: Uuid) {
        self.bindings.remove(&player_id);
    }

    pub fn table_for_player(&self, player_id: Uuid) -> Option<TableHandle> {
        let table_id = *self.bindings.get(&player_id)?;
        self.table(table_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistering_a_table_drops_its_bindings() {
        let registry = TableRegistry::new();
        let player = Uuid::new_v4();
        let table_id = Uuid::new_v4();
        registry.bind_player(player, table_id);
        assert!(registry.table_for_player(player).is_none()); // no handle registered yet
        registry.remove_table(table_id);
        assert!(registry.bindings.is_empty());
    }
}
