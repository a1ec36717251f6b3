use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::deck::{all_faces, Face};

/// Nominal size of a card image, also used for drawn placeholders.
pub const CARD_WIDTH: f32 = 240.0;
pub const CARD_HEIGHT: f32 = 340.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InkColor {
    Red,
    Black,
}

/// What a renderer should draw for a face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardArt {
    Image(PathBuf),
    /// Procedurally drawn card: rank above the suit symbol.
    Placeholder { label: String, ink: InkColor },
}

impl CardArt {
    pub fn placeholder(face: Face) -> Self {
        let ink = if face.suit.is_red() {
            InkColor::Red
        } else {
            InkColor::Black
        };
        CardArt::Placeholder {
            label: format!("{}\n{}", face.rank, face.suit.symbol()),
            ink,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, CardArt::Placeholder { .. })
    }
}

/// Registry of card images found under `<root>/images/<faceId>.png`.
#[derive(Debug, Default)]
pub struct CardAssets {
    root: PathBuf,
    images: HashMap<Face, PathBuf>,
}

impl CardAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            images: HashMap::new(),
        }
    }

    /// Registers every face image that exists on disk. Returns how many were found.
    pub fn scan(&mut self) -> usize {
        for face in all_faces() {
            let path = self.image_path(face);
            if path.is_file() {
                self.images.insert(face, path);
            }
        }
        self.images.len()
    }

    pub fn register(&mut self, face: Face, path: impl Into<PathBuf>) {
        self.images.insert(face, path.into());
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_path(&self, face: Face) -> PathBuf {
        self.root.join("images").join(format!("{}.png", face.id()))
    }

    /// Registered image for `face`, or a drawn placeholder when it is missing.
    pub fn resolve(&self, face: Face) -> CardArt {
        match self.images.get(&face) {
            Some(path) => CardArt::Image(path.clone()),
            None => CardArt::placeholder(face),
        }
    }
}
