//! Multi-tile container: owns tile binaries, hands out tile and polygon
//! references, and indexes tiles by grid location.

use byteorder::{ByteOrder, LittleEndian};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::geom::{ilog2, next_pow2, Vec3};
use crate::tile::{read_vert, write_vert, MeshHeader, TileFormatError, TileView};

pub const DEFAULT_CELL_SIZE: f32 = 1.0 / 6.0;
pub const DEFAULT_TILE_SIZE: f32 = DEFAULT_CELL_SIZE * 256.0;

/// Tile index and polygon index share this many reference bits.
pub const ID_BITS: u32 = 22;
pub const MAX_TILE_BITS: u32 = 14;

pub type PolyRef = u32;
pub type TileRef = u32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavMeshParams {
    pub orig: Vec3,
    pub tile_width: f32,
    pub tile_height: f32,
    pub max_tiles: i32,
    pub max_polys: i32,
}

impl NavMeshParams {
    pub const SIZE: usize = 28;

    /// Splits the reference bits between `n` tiles and their polygons.
    pub fn for_tile_count(n: usize) -> Self {
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        let tile_bits = ilog2(next_pow2(n)).min(MAX_TILE_BITS);
        let poly_bits = ID_BITS - tile_bits;
        NavMeshParams {
            orig: [0.0; 3],
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            max_tiles: 1 << tile_bits,
            max_polys: 1 << poly_bits,
        }
    }

    pub fn read(b: &[u8]) -> Self {
        NavMeshParams {
            orig: read_vert(&b[0..12]),
            tile_width: LittleEndian::read_f32(&b[12..16]),
            tile_height: LittleEndian::read_f32(&b[16..20]),
            max_tiles: LittleEndian::read_i32(&b[20..24]),
            max_polys: LittleEndian::read_i32(&b[24..28]),
        }
    }

    pub fn write(&self, b: &mut [u8]) {
        write_vert(&mut b[0..12], self.orig);
        LittleEndian::write_f32(&mut b[12..16], self.tile_width);
        LittleEndian::write_f32(&mut b[16..20], self.tile_height);
        LittleEndian::write_i32(&mut b[20..24], self.max_tiles);
        LittleEndian::write_i32(&mut b[24..28], self.max_polys);
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("invalid mesh params: {0}")]
    InvalidParams(&'static str),
    #[error(transparent)]
    TileFormat(#[from] TileFormatError),
    #[error("tile location ({x}, {y}, layer {layer}) is occupied")]
    Occupied { x: i32, y: i32, layer: i32 },
    #[error("tile has {count} polygons, budget is {max}")]
    PolyBudget { count: i32, max: i32 },
    #[error("no free tile slots")]
    OutOfSlots,
    #[error("tile slot {0} is already taken")]
    SlotTaken(usize),
    #[error("invalid reference {0:#x}")]
    InvalidRef(u32),
}

/// One container slot. Empty slots keep their salt so stale references can be
/// told apart from live ones.
#[derive(Debug, Clone)]
pub struct MeshTile {
    salt: u32,
    header: Option<MeshHeader>,
    data: Vec<u8>,
}

impl MeshTile {
    pub fn salt(&self) -> u32 { self.salt }
    pub fn header(&self) -> Option<&MeshHeader> { self.header.as_ref() }
    pub fn data(&self) -> &[u8] { &self.data }
    pub fn is_empty(&self) -> bool { self.header.is_none() }
}

#[derive(Debug, Clone)]
pub struct NavMesh {
    params: NavMeshParams,
    tile_bits: u32,
    poly_bits: u32,
    salt_bits: u32,
    tiles: Vec<MeshTile>,
    /// Free slots; the lowest index is on top.
    free: Vec<usize>,
    lookup: FxHashMap<(i32, i32, i32), usize>,
}

impl NavMesh {
    pub fn new(params: NavMeshParams) -> Result<Self, MeshError> {
        if params.max_tiles <= 0 {
            return Err(MeshError::InvalidParams("max_tiles must be positive"));
        }
        if params.max_polys <= 0 {
            return Err(MeshError::InvalidParams("max_polys must be positive"));
        }
        let tile_bits = ilog2(next_pow2(params.max_tiles as u32));
        let poly_bits = ilog2(next_pow2(params.max_polys as u32));
        let salt_bits = 32u32.saturating_sub(tile_bits + poly_bits).min(31);
        if salt_bits < 10 {
            return Err(MeshError::InvalidParams("fewer than 10 salt bits left"));
        }
        let n = params.max_tiles as usize;
        let tiles = vec![MeshTile { salt: 1, header: None, data: Vec::new() }; n];
        let free = (0..n).rev().collect();
        debug!(max_tiles = n, tile_bits, poly_bits, salt_bits, "mesh initialised");
        Ok(NavMesh { params, tile_bits, poly_bits, salt_bits, tiles, free, lookup: FxHashMap::default() })
    }

    pub fn params(&self) -> &NavMeshParams { &self.params }
    pub fn max_tiles(&self) -> usize { self.tiles.len() }
    pub fn tile_count(&self) -> usize { self.lookup.len() }

    pub fn set_tile_size(&mut self, size: f32) {
        self.params.tile_width = size;
        self.params.tile_height = size;
    }

    pub fn encode_poly_ref(&self, salt: u32, tile: usize, poly: usize) -> PolyRef {
        (salt << (self.poly_bits + self.tile_bits)) | ((tile as u32) << self.poly_bits) | poly as u32
    }

    /// Returns `(salt, tile index, poly index)`.
    pub fn decode_poly_ref(&self, r: PolyRef) -> (u32, usize, usize) {
        let salt_mask = (1u32 << self.salt_bits) - 1;
        let tile_mask = (1u32 << self.tile_bits) - 1;
        let poly_mask = (1u32 << self.poly_bits) - 1;
        let salt = (r >> (self.poly_bits + self.tile_bits)) & salt_mask;
        let tile = (r >> self.poly_bits) & tile_mask;
        (salt, tile as usize, (r & poly_mask) as usize)
    }

    /// Slot index of a live tile reference.
    pub fn tile_index(&self, r: TileRef) -> Option<usize> {
        let (salt, it, _) = self.decode_poly_ref(r);
        let tile = self.tiles.get(it)?;
        (tile.salt == salt && !tile.is_empty()).then_some(it)
    }

    /// Registers a tile binary. `last_ref` restores a previously issued slot and
    /// salt so references stay valid across save/load.
    pub fn add_tile(&mut self, data: Vec<u8>, last_ref: Option<TileRef>) -> Result<TileRef, MeshError> {
        let header = *TileView::parse(&data)?.header();
        let key = (header.x, header.y, header.layer);
        if self.lookup.contains_key(&key) {
            return Err(MeshError::Occupied { x: header.x, y: header.y, layer: header.layer });
        }
        if header.poly_count > self.params.max_polys {
            return Err(MeshError::PolyBudget { count: header.poly_count, max: self.params.max_polys });
        }

        let (it, salt) = match last_ref {
            Some(r) => {
                let (salt, it, _) = self.decode_poly_ref(r);
                if salt == 0 || it >= self.tiles.len() {
                    return Err(MeshError::InvalidRef(r));
                }
                let pos = self.free.iter().position(|&f| f == it).ok_or(MeshError::SlotTaken(it))?;
                self.free.remove(pos);
                (it, salt)
            }
            None => {
                let it = self.free.pop().ok_or(MeshError::OutOfSlots)?;
                (it, self.tiles[it].salt)
            }
        };

        self.tiles[it] = MeshTile { salt, header: Some(header), data };
        self.lookup.insert(key, it);
        Ok(self.encode_poly_ref(salt, it, 0))
    }

    /// Unregisters a tile and hands its bytes back. The slot's salt is bumped so
    /// old references stop resolving.
    pub fn remove_tile(&mut self, r: TileRef) -> Result<Vec<u8>, MeshError> {
        let it = self.tile_index(r).ok_or(MeshError::InvalidRef(r))?;
        let salt_mask = (1u32 << self.salt_bits) - 1;
        let tile = &mut self.tiles[it];
        if let Some(h) = tile.header.take() {
            self.lookup.remove(&(h.x, h.y, h.layer));
        }
        tile.salt = (tile.salt + 1) & salt_mask;
        if tile.salt == 0 {
            tile.salt = 1;
        }
        let data = std::mem::take(&mut tile.data);
        self.free.push(it);
        Ok(data)
    }

    pub fn tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        self.lookup.get(&(x, y, layer)).map(|&it| &self.tiles[it])
    }

    pub fn tiles_at(&self, x: i32, y: i32) -> impl Iterator<Item = (TileRef, &MeshTile)> + '_ {
        self.tiles().filter(move |(_, t)| t.header.is_some_and(|h| h.x == x && h.y == y))
    }

    pub fn tile_by_ref(&self, r: TileRef) -> Option<&MeshTile> {
        self.tile_index(r).map(|it| &self.tiles[it])
    }

    /// Reference of the tile in slot `it`, if one is resident.
    pub fn tile_ref_at(&self, it: usize) -> Option<TileRef> {
        let tile = self.tiles.get(it)?;
        (!tile.is_empty()).then(|| self.encode_poly_ref(tile.salt, it, 0))
    }

    /// Resident tiles in slot order.
    pub fn tiles(&self) -> impl Iterator<Item = (TileRef, &MeshTile)> + '_ {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.is_empty())
            .map(|(it, t)| (self.encode_poly_ref(t.salt, it, 0), t))
    }
}

/// Majority vote over observed tile extents; the first value seeds the
/// estimate, agreeing values raise its weight, others lower it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TileSizeVote {
    size: f32,
    votes: i32,
    seen: usize,
}

impl TileSizeVote {
    pub const EPSILON: f32 = 1e-4;

    pub fn new() -> Self { Self::default() }

    pub fn observe(&mut self, size: f32) {
        self.seen += 1;
        if self.votes == 0 {
            self.size = size;
            self.votes = 1;
        } else if (self.size - size).abs() < Self::EPSILON {
            self.votes += 1;
        } else {
            self.votes -= 1;
        }
    }

    pub fn votes(&self) -> i32 { self.votes }
    pub fn seen(&self) -> usize { self.seen }

    pub fn finish(&self) -> f32 {
        if self.seen == 0 { DEFAULT_TILE_SIZE } else { self.size }
    }
}
