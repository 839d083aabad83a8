//! In-memory drinks table and its two serialization views.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// One ingredient of a drink's recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub color: String,
    pub parts: u32,
}

/// A recipe as sent by clients: either a single ingredient or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RecipeInput {
    Single(Ingredient),
    Multiple(Vec<Ingredient>),
}

impl From<RecipeInput> for Vec<Ingredient> {
    fn from(recipe: RecipeInput) -> Self {
        match recipe {
            RecipeInput::Single(ingredient) => vec![ingredient],
            RecipeInput::Multiple(ingredients) => ingredients,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drink {
    pub id: u64,
    pub title: String,
    pub recipe: Vec<Ingredient>,
}

/// Public view of a drink: the recipe only tells colors and proportions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortDrink {
    pub id: u64,
    pub title: String,
    pub recipe: Vec<ShortIngredient>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShortIngredient {
    pub color: String,
    pub parts: u32,
}

/// Detailed view of a drink, including ingredient names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LongDrink {
    pub id: u64,
    pub title: String,
    pub recipe: Vec<Ingredient>,
}

impl Drink {
    pub fn short(&self) -> ShortDrink {
        ShortDrink {
            id: self.id,
            title: self.title.clone(),
            recipe: self
                .recipe
                .iter()
                .map(|ingredient| ShortIngredient {
                    color: ingredient.color.clone(),
                    parts: ingredient.parts,
                })
                .collect(),
        }
    }

    pub fn long(&self) -> LongDrink {
        LongDrink {
            id: self.id,
            title: self.title.clone(),
            recipe: self.recipe.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("drink {0} not found")]
    NotFound(u64),
    #[error("a drink titled `{0}` already exists")]
    Conflict(String),
}

#[derive(Default)]
struct Table {
    next_id: u64,
    rows: BTreeMap<u64, Drink>,
}

impl Table {
    fn title_taken(&self, title: &str, except: Option<u64>) -> bool {
        self.rows
            .values()
            .any(|drink| drink.title == title && Some(drink.id) != except)
    }
}

/// Drinks keyed by id, ids assigned incrementally from 1. Titles are unique.
#[derive(Default)]
pub struct DrinkStore {
    table: RwLock<Table>,
}

impl DrinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<Drink> {
        self.table.read().await.rows.values().cloned().collect()
    }

    #[cfg(test)]
    async fn get(&self, id: u64) -> Result<Drink, StoreError> {
        self.table
            .read()
            .await
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    pub async fn insert(&self, title: String, recipe: Vec<Ingredient>) -> Result<Drink, StoreError> {
        let mut table = self.table.write().await;
        if table.title_taken(&title, None) {
            return Err(StoreError::Conflict(title));
        }

        table.next_id += 1;
        let drink = Drink {
            id: table.next_id,
            title,
            recipe,
        };
        table.rows.insert(drink.id, drink.clone());
        Ok(drink)
    }

    /// Replaces the title and/or recipe of a drink, keeping whatever is `None`.
    pub async fn update(
        &self,
        id: u64,
        title: Option<String>,
        recipe: Option<Vec<Ingredient>>,
    ) -> Result<Drink, StoreError> {
        let mut table = self.table.write().await;
        if let Some(title) = &title {
            if table.title_taken(title, Some(id)) {
                return Err(StoreError::Conflict(title.clone()));
            }
        }

        let drink = table.rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(title) = title {
            drink.title = title;
        }
        if let Some(recipe) = recipe {
            drink.recipe = recipe;
        }
        Ok(drink.clone())
    }

    pub async fn delete(&self, id: u64) -> Result<(), StoreError> {
        self.table
            .write()
            .await
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}
