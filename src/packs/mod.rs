// Packs Module
// Read-only sound-pack catalog and instrument/character resolution

pub mod core_pack;
pub mod types;

use std::path::Path;
use std::sync::OnceLock;

use thiserror::Error;

use crate::project::SoundSource;

pub use core_pack::{core_pack, CORE_PACK_ID};
pub use types::{
    CharacterDefaults, CharacterOptions, EffectSpec, InstrumentCharacter, InstrumentDefinition,
    LayerSource, LayerSpec, SoundPack,
};

#[derive(Debug, Error)]
pub enum PackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pack file: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type PackResult<T> = Result<T, PackError>;

/// A resolved instrument character together with where it came from
#[derive(Debug, Clone, Copy)]
pub struct ResolvedCharacter<'a> {
    pub pack: &'a SoundPack,
    pub instrument: &'a InstrumentDefinition,
    pub character: &'a InstrumentCharacter,
}

impl ResolvedCharacter<'_> {
    /// Voice cache key: `instrumentId:characterId`
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.instrument.id, self.character.id)
    }
}

/// Collection of sound packs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackCatalog {
    packs: Vec<SoundPack>,
}

static BUILTIN: OnceLock<PackCatalog> = OnceLock::new();

impl PackCatalog {
    pub fn new(packs: Vec<SoundPack>) -> Self {
        PackCatalog { packs }
    }

    /// Catalog holding only the built-in core pack (constructed once)
    pub fn builtin() -> &'static PackCatalog {
        BUILTIN.get_or_init(|| PackCatalog::new(vec![core_pack()]))
    }

    /// Parse a JSON array of packs
    pub fn from_json(json: &str) -> PackResult<Self> {
        Ok(PackCatalog::new(serde_json::from_str(json)?))
    }

    /// Built-in packs plus every pack in a JSON file
    pub fn load_with_builtin(path: &Path) -> PackResult<Self> {
        let extra = PackCatalog::from_json(&std::fs::read_to_string(path)?)?;
        let mut catalog = PackCatalog::builtin().clone();
        for pack in extra.packs {
            catalog.add_pack(pack);
        }
        log::info!("Loaded pack catalog with {} packs", catalog.packs.len());
        Ok(catalog)
    }

    /// Add a pack, replacing any pack with the same id
    pub fn add_pack(&mut self, pack: SoundPack) {
        self.packs.retain(|p| p.id != pack.id);
        self.packs.push(pack);
    }

    pub fn packs(&self) -> &[SoundPack] {
        &self.packs
    }

    pub fn pack(&self, id: &str) -> Option<&SoundPack> {
        self.packs.iter().find(|p| p.id == id)
    }

    pub fn instrument(&self, pack_id: &str, instrument_id: &str) -> Option<&InstrumentDefinition> {
        self.pack(pack_id)?.instrument(instrument_id)
    }

    /// Resolve a track's sound source to a concrete character
    pub fn resolve(&self, source: &SoundSource) -> Option<ResolvedCharacter<'_>> {
        let pack = self.pack(&source.pack_id)?;
        let instrument = pack.instrument(&source.instrument_id)?;
        let character = instrument.resolve_character(source.character_id.as_deref())?;
        Some(ResolvedCharacter {
            pack,
            instrument,
            character,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_shared() {
        let a = PackCatalog::builtin() as *const PackCatalog;
        let b = PackCatalog::builtin() as *const PackCatalog;
        assert_eq!(a, b);
        assert!(PackCatalog::builtin().pack(CORE_PACK_ID).is_some());
    }

    #[test]
    fn test_resolve_source() {
        let catalog = PackCatalog::builtin();
        let source = SoundSource::new("core", "kick").with_character("deep");
        let resolved = catalog.resolve(&source).unwrap();
        assert_eq!(resolved.character.id, "deep");
        assert_eq!(resolved.cache_key(), "kick:deep");

        let fallback = catalog.resolve(&SoundSource::new("core", "kick")).unwrap();
        assert_eq!(fallback.character.id, "punchy");

        assert!(catalog.resolve(&SoundSource::new("core", "tuba")).is_none());
        assert!(catalog.resolve(&SoundSource::new("missing", "kick")).is_none());
    }

    #[test]
    fn test_from_json_and_replace() {
        let json = r#"[{
            "id": "core",
            "instruments": [{ "id": "kick", "characters": [{ "id": "one", "type": "MembraneSynth" }] }]
        }]"#;
        let loaded = PackCatalog::from_json(json).unwrap();
        let mut catalog = PackCatalog::builtin().clone();
        for pack in loaded.packs().to_vec() {
            catalog.add_pack(pack);
        }
        assert_eq!(catalog.packs().len(), 1);
        let resolved = catalog.resolve(&SoundSource::new("core", "kick")).unwrap();
        assert_eq!(resolved.character.id, "one");
    }

    #[test]
    fn test_load_with_builtin_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("packs.json");
        std::fs::write(
            &path,
            r#"[{ "id": "extra", "instruments": [{ "id": "bell", "characters": [{ "id": "a", "type": "Synth" }] }] }]"#,
        )
        .unwrap();
        let catalog = PackCatalog::load_with_builtin(&path).unwrap();
        assert!(catalog.pack("core").is_some());
        assert!(catalog.instrument("extra", "bell").is_some());

        assert!(PackCatalog::load_with_builtin(&dir.path().join("missing.json")).is_err());
    }
}
