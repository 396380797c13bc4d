use rand::Rng;

use crate::domain::refund::Folio;

pub const DEFAULT_FOLIO_PREFIX: &str = "DEV";

pub trait FolioGenerator: Send + Sync {
    fn next_folio(&self, tax_year: i32) -> Folio;
}

/// Produces `<prefix>-<tax_year>-<6 digits>`. Uniqueness is checked on insert.
#[derive(Clone, Debug)]
pub struct RandomFolioGenerator {
    prefix: String,
}

impl RandomFolioGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Default for RandomFolioGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_FOLIO_PREFIX)
    }
}

impl FolioGenerator for RandomFolioGenerator {
    fn next_folio(&self, tax_year: i32) -> Folio {
        let serial: u32 = rand::thread_rng().gen_range(0..1_000_000);
        Folio(format!("{}-{tax_year}-{serial:06}", self.prefix))
    }
}
