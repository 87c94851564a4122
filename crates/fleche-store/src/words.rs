use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A dictionary word with its best definition, as consumed by the word bank.
/// Words without any stored definition are filtered out at query time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredWord {
    pub normalized: String,
    pub lemma: String,
    pub frequency: f64,
    pub clue: String,
    pub clue_full: String,
}

pub struct WordRepo {
    db: Database,
}

impl WordRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a word with one definition. Used by ingest tooling and seeding.
    #[instrument(skip(self, clue_text, clue_short), fields(normalized))]
    pub fn insert(
        &self,
        lemma: &str,
        normalized: &str,
        frequency: f64,
        clue_text: &str,
        clue_short: Option<&str>,
        quality_score: f64,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO words (lemma, normalized, length, frequency)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(normalized) DO UPDATE SET frequency = excluded.frequency",
                rusqlite::params![lemma, normalized, normalized.len() as i64, frequency],
            )?;
            let word_id: i64 = conn.query_row(
                "SELECT id FROM words WHERE normalized = ?1",
                [normalized],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO word_clues (word_id, clue_text, clue_short, quality_score)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![word_id, clue_text, clue_short, quality_score],
            )?;
            Ok(())
        })
    }

    /// Insert a word with no definition. Such words never enter the cache.
    pub fn insert_undefined(&self, lemma: &str, normalized: &str, frequency: f64) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO words (lemma, normalized, length, frequency)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![lemma, normalized, normalized.len() as i64, frequency],
            )?;
            Ok(())
        })
    }

    /// All words carrying at least one definition, best definition first
    /// (highest quality score), ordered by descending frequency.
    pub fn all_with_best_clue(&self) -> Result<Vec<StoredWord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT w.normalized, w.lemma, w.frequency,
                        COALESCE(c.clue_short, c.clue_text), c.clue_text
                 FROM words w
                 JOIN word_clues c ON c.word_id = w.id
                 WHERE c.id = (SELECT c2.id FROM word_clues c2
                               WHERE c2.word_id = w.id
                               ORDER BY c2.quality_score DESC, c2.id LIMIT 1)
                 ORDER BY w.frequency DESC, w.normalized",
            )?;
            let mut rows = stmt.query([])?;
            let mut words = Vec::new();
            while let Some(row) = rows.next()? {
                words.push(StoredWord {
                    normalized: row_helpers::get(row, 0, "words", "normalized")?,
                    lemma: row_helpers::get(row, 1, "words", "lemma")?,
                    frequency: row_helpers::get(row, 2, "words", "frequency")?,
                    clue: row_helpers::get(row, 3, "word_clues", "clue_short")?,
                    clue_full: row_helpers::get(row, 4, "word_clues", "clue_text")?,
                });
            }
            Ok(words)
        })
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM words", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }

    /// Seed the built-in starter dictionary when the words table is empty,
    /// so a fresh install can generate grids without an ingest run.
    pub fn seed_demo_words(&self) -> Result<usize, StoreError> {
        if self.count()? > 0 {
            return Ok(0);
        }
        let words = demo_words();
        let total = words.len();
        for (rank, (lemma, normalized, clue)) in words.iter().enumerate() {
            // Earlier list position = higher frequency.
            let frequency = (total - rank) as f64;
            self.insert(lemma, normalized, frequency, clue, None, 1.0)?;
        }
        info!(count = total, "seeded demo dictionary");
        Ok(total)
    }
}

/// Starter dictionary: common French words with short definitions.
fn demo_words() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        ("air", "AIR", "Gaz respiré"),
        ("eau", "EAU", "Liquide vital"),
        ("feu", "FEU", "Flamme brûlante"),
        ("sol", "SOL", "Surface terrestre"),
        ("mer", "MER", "Étendue salée"),
        ("rue", "RUE", "Voie urbaine"),
        ("vie", "VIE", "Existence"),
        ("nid", "NID", "Abri d'oiseau"),
        ("roi", "ROI", "Monarque"),
        ("blé", "BLE", "Céréale dorée"),
        ("thé", "THE", "Boisson chaude"),
        ("riz", "RIZ", "Céréale asiatique"),
        ("mars", "MARS", "Planète rouge"),
        ("lune", "LUNE", "Astre nocturne"),
        ("chat", "CHAT", "Animal qui miaule"),
        ("lion", "LION", "Roi des animaux"),
        ("rose", "ROSE", "Fleur épineuse"),
        ("bleu", "BLEU", "Couleur du ciel"),
        ("noir", "NOIR", "Couleur sombre"),
        ("vert", "VERT", "Couleur nature"),
        ("pain", "PAIN", "Aliment boulanger"),
        ("lait", "LAIT", "Boisson blanche"),
        ("bois", "BOIS", "Matériau arbre"),
        ("peur", "PEUR", "Émotion effrayante"),
        ("joie", "JOIE", "Bonheur intense"),
        ("nuit", "NUIT", "Période sombre"),
        ("jour", "JOUR", "Période claire"),
        ("ange", "ANGE", "Être céleste"),
        ("rêve", "REVE", "Songe nocturne"),
        ("café", "CAFE", "Boisson noire"),
        ("dent", "DENT", "Os de bouche"),
        ("main", "MAIN", "Extrémité du bras"),
        ("pied", "PIED", "Base du corps"),
        ("tête", "TETE", "Sommet du corps"),
        ("terre", "TERRE", "Notre planète"),
        ("monde", "MONDE", "Univers habité"),
        ("coeur", "COEUR", "Organe vital"),
        ("amour", "AMOUR", "Sentiment fort"),
        ("rouge", "ROUGE", "Couleur sang"),
        ("blanc", "BLANC", "Couleur neige"),
        ("table", "TABLE", "Meuble plat"),
        ("arbre", "ARBRE", "Végétal ligneux"),
        ("fleur", "FLEUR", "Organe coloré"),
        ("océan", "OCEAN", "Grande étendue"),
        ("nuage", "NUAGE", "Vapeur céleste"),
        ("pluie", "PLUIE", "Eau tombante"),
        ("neige", "NEIGE", "Flocons blancs"),
        ("ombre", "OMBRE", "Zone obscure"),
        ("livre", "LIVRE", "Ouvrage écrit"),
        ("école", "ECOLE", "Lieu d'études"),
        ("verre", "VERRE", "Récipient transparent"),
        ("fruit", "FRUIT", "Produit végétal"),
        ("sucre", "SUCRE", "Poudre douce"),
        ("avion", "AVION", "Appareil volant"),
        ("soleil", "SOLEIL", "Astre du jour"),
        ("orange", "ORANGE", "Agrume coloré"),
        ("banane", "BANANE", "Fruit jaune courbé"),
        ("maison", "MAISON", "Habitation"),
        ("jardin", "JARDIN", "Espace vert"),
        ("bateau", "BATEAU", "Navire flottant"),
        ("cheval", "CHEVAL", "Équidé domestique"),
        ("fenêtre", "FENETRE", "Ouverture vitrée"),
        ("cuisine", "CUISINE", "Pièce des repas"),
        ("voiture", "VOITURE", "Véhicule automobile"),
        ("montagne", "MONTAGNE", "Relief élevé"),
        ("papillon", "PAPILLON", "Insecte ailé"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> WordRepo {
        WordRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn insert_and_list() {
        let repo = repo();
        repo.insert("mars", "MARS", 10.0, "Planète rouge", Some("Planète"), 2.0).unwrap();

        let words = repo.all_with_best_clue().unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].normalized, "MARS");
        assert_eq!(words[0].clue, "Planète");
        assert_eq!(words[0].clue_full, "Planète rouge");
    }

    #[test]
    fn best_clue_wins_by_quality() {
        let repo = repo();
        repo.insert("mars", "MARS", 10.0, "Définition médiocre", None, 0.5).unwrap();
        repo.insert("mars", "MARS", 10.0, "Planète rouge", None, 3.0).unwrap();

        let words = repo.all_with_best_clue().unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].clue_full, "Planète rouge");
    }

    #[test]
    fn undefined_words_are_excluded() {
        let repo = repo();
        repo.insert("mars", "MARS", 10.0, "Planète rouge", None, 1.0).unwrap();
        repo.insert_undefined("xylo", "XYLO", 99.0).unwrap();

        let words = repo.all_with_best_clue().unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].normalized, "MARS");
    }

    #[test]
    fn ordered_by_frequency_desc() {
        let repo = repo();
        repo.insert("rare", "RARE", 1.0, "Peu fréquent", None, 1.0).unwrap();
        repo.insert("mars", "MARS", 10.0, "Planète rouge", None, 1.0).unwrap();

        let words = repo.all_with_best_clue().unwrap();
        assert_eq!(words[0].normalized, "MARS");
        assert_eq!(words[1].normalized, "RARE");
    }

    #[test]
    fn seed_demo_only_when_empty() {
        let repo = repo();
        let seeded = repo.seed_demo_words().unwrap();
        assert!(seeded > 50);
        assert_eq!(repo.count().unwrap(), seeded);

        // Second call is a no-op.
        assert_eq!(repo.seed_demo_words().unwrap(), 0);
        assert_eq!(repo.count().unwrap(), seeded);
    }

    #[test]
    fn seeded_words_all_have_clues() {
        let repo = repo();
        let seeded = repo.seed_demo_words().unwrap();
        let words = repo.all_with_best_clue().unwrap();
        assert_eq!(words.len(), seeded);
        assert!(words.iter().all(|w| !w.clue.is_empty()));
    }
}
