use std::collections::HashMap;
use std::sync::Mutex;

use crate::directory::{
    directory_error::DirectoryError,
    room_directory::{RoomDirectory, RoomFile, RoomInfo, validate_files},
};
use crate::signaling::RoomCode;

/// In-process directory; codes are random and never collide.
#[derive(Default)]
pub struct MemoryRoomDirectory {
    rooms: Mutex<HashMap<RoomCode, Vec<RoomFile>>>,
}

impl MemoryRoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, code: &RoomCode) -> bool {
        self.rooms
            .lock()
            .map(|mut r| r.remove(code).is_some())
            .unwrap_or(false)
    }
}

impl RoomDirectory for MemoryRoomDirectory {
    fn create_room(&self, files: &[RoomFile]) -> Result<RoomCode, DirectoryError> {
        validate_files(files)?;
        let mut rooms = self
            .rooms
            .lock()
            .map_err(|_| DirectoryError::Http("directory lock poisoned".into()))?;
        let mut rng = rand::thread_rng();
        let code = loop {
            let c = RoomCode::generate(&mut rng);
            if !rooms.contains_key(&c) {
                break c;
            }
        };
        let stored = files
            .iter()
            .enumerate()
            .map(|(i, f)| {
                let mut f = f.clone();
                if f.id.is_empty() {
                    f.id = format!("{}-{i}", code.as_str());
                }
                f
            })
            .collect();
        rooms.insert(code.clone(), stored);
        Ok(code)
    }

    fn room_info(&self, code: &RoomCode) -> Result<RoomInfo, DirectoryError> {
        let rooms = self
            .rooms
            .lock()
            .map_err(|_| DirectoryError::Http("directory lock poisoned".into()))?;
        let files = rooms
            .get(code)
            .ok_or_else(|| DirectoryError::Rejected(format!("room {} does not exist", code.as_str())))?;
        Ok(RoomInfo {
            code: Some(code.clone()),
            files: files.clone(),
            ..RoomInfo::default()
        })
    }
}
