use std::hash::Hash;

use bimap::BiMap;
use string_cache::DefaultAtom;

/**
  A symbol table is a mapping between textual names and the dense integer names the IR uses for
  functions, labels and data entries. Integers are handed out in order of first insertion, so
  they can index the vectors they name. A symbol table is really just a convenience wrapper
  around a BiMap.
*/
#[derive(Clone, Debug)]
pub struct SymbolTable<Id>
  where Id: Copy + Eq + Hash + From<u32>
{
  table: BiMap<DefaultAtom, Id>
}

impl<Id> SymbolTable<Id>
  where Id: Copy + Eq + Hash + From<u32>
{

  pub fn new() -> SymbolTable<Id> {
    SymbolTable{
      table: BiMap::new()
    }
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }

  pub fn get_symbol(&self, id: &Id) -> Option<&DefaultAtom>{
    self.table.get_by_right(id)
  }

  pub fn get_id(&self, name: &str) -> Option<Id>{
    self.table.get_by_left(&DefaultAtom::from(name)).copied()
  }

  /// Adds a new name, failing with the existing id if the name is already present.
  pub fn insert(&mut self, name: &str) -> Result<Id, Id>{
    if let Some(id) = self.get_id(name) {
      return Err(id);
    }
    let id = Id::from(self.table.len() as u32);
    self.table.insert(DefaultAtom::from(name), id);
    Ok(id)
  }

  /// Returns the id of `name`, adding it if it is not yet present.
  pub fn intern(&mut self, name: &str) -> Id {
    match self.insert(name) {
      Ok(id) | Err(id) => id
    }
  }

  /// The names in id order.
  pub fn names(&self) -> Vec<DefaultAtom>
    where Id: Ord
  {
    let mut pairs: Vec<(&DefaultAtom, &Id)> = self.table.iter().collect();
    pairs.sort_by_key(|(_, id)| **id);
    pairs.into_iter().map(|(name, _)| name.clone()).collect()
  }
}

impl<Id> Default for SymbolTable<Id>
  where Id: Copy + Eq + Hash + From<u32>
{
  fn default() -> Self {
    SymbolTable::new()
  }
}
