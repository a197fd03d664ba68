strong_type!(ChunkId, u64);

impl ChunkId {
    /// Id `0` is reserved: the pool never queues or hands it out.
    pub const RESERVED: ChunkId = ChunkId(0);

    /// Whether this id is the reserved sentinel.
    pub fn is_reserved(self) -> bool {
        self.raw() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_basic() {
        let id = ChunkId(12345);
        assert_eq!(*id, 12345u64);
        assert_eq!(format!("{}", id), "12345");
        assert_eq!(format!("{:?}", id), "ChunkId(12345)");
    }

    #[test]
    fn test_chunk_id_reserved() {
        assert!(ChunkId::RESERVED.is_reserved());
        assert!(ChunkId(0).is_reserved());
        assert!(!ChunkId(1).is_reserved());
    }

    #[test]
    fn test_chunk_id_serde() {
        let id = ChunkId(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
        let parsed: ChunkId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
