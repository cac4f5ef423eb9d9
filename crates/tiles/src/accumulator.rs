use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use film_protocol::{ChannelSet, ConfigurationError, FilmConfig, FilmSettings, ImageBlock};
use model::TileCoord;

use crate::block_buffer::{BufferUsage, FreeList};
use crate::merge::MergeEngine;
use crate::neighborhood::NeighborhoodTracker;
use crate::store::{FileTileStore, StoreError, StoreHeader, TiledImageStore};
use crate::tile_index::{TileIndex, TileSlot};
use crate::tile_writer::TileWriter;
use crate::{FilmError, ProtocolError};

const GENERATED_BY: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Counters reported when the film is shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSummary {
    pub tiles_written: usize,
    pub tiles_total: usize,
    /// Tiles that were submitted but never completed their neighborhood.
    pub tiles_abandoned: usize,
    /// Most block buffers held at once over the run.
    pub peak_buffers: usize,
}

impl fmt::Display for FlushSummary {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} of {} tiles written, peak {} buffers",
            self.tiles_written, self.tiles_total, self.peak_buffers
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Configured,
    Accepting,
    Aborted,
    /// Buffers are released but the store has not closed cleanly yet.
    CloseFailed(FlushSummary),
    Closed(FlushSummary),
}

/// Owns every block buffer of one output image and drives submit -> merge -> write -> release.
///
/// Not synchronized; wrap it in a [`SharedAccumulator`] to submit from several threads.
#[derive(Debug)]
pub struct TileAccumulator<S> {
    settings: FilmSettings,
    destination: Option<PathBuf>,
    channels: Option<ChannelSet>,
    index: TileIndex,
    free_list: FreeList,
    usage: BufferUsage,
    writer: TileWriter<S>,
    state: RunState,
}

impl TileAccumulator<FileTileStore> {
    /// Parses the format strings and creates the output file, forcing its extension.
    pub fn configure(
        width: u32,
        height: u32,
        tile_size: u32,
        pixel_layout: &str,
        component_encoding: &str,
        output_path: &Path,
    ) -> Result<Self, ConfigurationError> {
        let settings = FilmSettings::parse(
            width,
            height,
            tile_size,
            pixel_layout,
            component_encoding,
            false,
        )?;
        Self::create(settings, output_path)
    }

    pub fn from_config(config: &FilmConfig) -> Result<Self, ConfigurationError> {
        let output_path = config
            .filename
            .as_deref()
            .ok_or(ConfigurationError::MissingOutputPath)?;
        Self::create(config.resolve()?, output_path)
    }

    fn create(settings: FilmSettings, output_path: &Path) -> Result<Self, ConfigurationError> {
        let store = FileTileStore::create(output_path)?;
        let destination = store.path().to_path_buf();
        let mut accumulator = Self::new(settings, store);
        accumulator.destination = Some(destination);
        Ok(accumulator)
    }
}

impl<S: TiledImageStore> TileAccumulator<S> {
    pub fn new(settings: FilmSettings, store: S) -> Self {
        Self {
            settings,
            destination: None,
            channels: None,
            index: TileIndex::new(settings.grid),
            free_list: FreeList::new(),
            usage: BufferUsage::default(),
            writer: TileWriter::new(store, settings.grid, settings.component_encoding),
            state: RunState::Configured,
        }
    }

    /// Fixes the channel list for the run and writes the store header.
    ///
    /// Duplicate names are rejected before any block can be accepted.
    pub fn prepare<I, N>(&mut self, channel_names: I) -> Result<(), FilmError>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        match self.state {
            RunState::Configured => {}
            RunState::Accepting => return Err(ConfigurationError::AlreadyPrepared.into()),
            RunState::Aborted | RunState::CloseFailed(_) => return Err(FilmError::Aborted),
            RunState::Closed(_) => return Err(ProtocolError::Closed.into()),
        }
        let channels = ChannelSet::for_layout(self.settings.pixel_layout, channel_names)?;
        let header = StoreHeader {
            width: self.settings.grid.size().x,
            height: self.settings.grid.size().y,
            tile_size: self.settings.grid.tile_size(),
            channels: channels.names().iter().map(ToString::to_string).collect(),
            component_encoding: self.settings.component_encoding,
            pixel_layout: self.settings.pixel_layout,
            chromaticities: self.settings.pixel_layout.chromaticities(),
            generated_by: GENERATED_BY.to_owned(),
        };
        if let Err(error) = self.writer.begin(&header) {
            return Err(self.abort(error.into()));
        }
        tracing::debug!(channels = ?header.channels, "film channels prepared");
        self.channels = Some(channels);
        self.state = RunState::Accepting;
        Ok(())
    }

    /// Accepts one block and flushes every tile its arrival completes.
    ///
    /// Any error is fatal: the accumulator refuses all later submits with
    /// [`FilmError::Aborted`].
    pub fn submit(&mut self, block: &ImageBlock) -> Result<(), FilmError> {
        self.ensure_accepting()?;
        match self.accept(block) {
            Ok(()) => Ok(()),
            Err(error) => Err(self.abort(error)),
        }
    }

    /// Flushes `coord` if it is live and its whole neighborhood has been submitted.
    ///
    /// Returns whether the tile was written.
    pub fn try_finalize(&mut self, coord: TileCoord) -> Result<bool, FilmError> {
        self.ensure_accepting()?;
        match self.finalize_if_complete(coord) {
            Ok(flushed) => Ok(flushed),
            Err(error) => Err(self.abort(error.into())),
        }
    }

    /// Releases every buffer, closes the store and reports the run.
    ///
    /// Tiles that never completed are dropped unwritten. Once the store has closed, calling this
    /// again returns the first summary without touching the store. If closing the store fails,
    /// the run counts as aborted and the next call retries the close.
    pub fn shutdown(&mut self) -> Result<FlushSummary, FilmError> {
        let summary = match self.state {
            RunState::Closed(summary) => return Ok(summary),
            RunState::CloseFailed(summary) => summary,
            _ => self.release_all(),
        };
        if let Err(error) = self.writer.finish() {
            let error = FilmError::from(error);
            tracing::error!(%error, "closing tiled film failed");
            self.state = RunState::CloseFailed(summary);
            return Err(error);
        }
        self.state = RunState::Closed(summary);
        tracing::info!("{summary}");
        Ok(summary)
    }

    fn release_all(&mut self) -> FlushSummary {
        let abandoned = self.index.drain_live();
        let tiles_abandoned = abandoned.len();
        for (coord, slot) in abandoned {
            tracing::trace!(tile = %coord, "releasing pending tile");
            self.release(slot);
        }
        if tiles_abandoned > 0 {
            tracing::warn!(
                tiles_abandoned,
                "film shut down with tiles whose neighborhood never completed"
            );
        }

        let summary = FlushSummary {
            tiles_written: self.writer.tiles_written(),
            tiles_total: self.settings.grid.tile_count(),
            tiles_abandoned,
            peak_buffers: self.usage.peak(),
        };
        let freed = self.free_list.clear();
        tracing::debug!(freed_buffers = freed, "released block buffers");
        summary
    }

    pub fn settings(&self) -> &FilmSettings {
        &self.settings
    }

    pub fn channels(&self) -> Option<&ChannelSet> {
        self.channels.as_ref()
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn pending_tiles(&self) -> usize {
        self.index.live_count()
    }

    pub fn tiles_written(&self) -> usize {
        self.writer.tiles_written()
    }

    pub fn index(&self) -> &TileIndex {
        &self.index
    }

    pub fn free_list(&self) -> &FreeList {
        &self.free_list
    }

    pub fn store(&self) -> &S {
        self.writer.store()
    }

    /// Gives the store back, typically after [`TileAccumulator::shutdown`].
    pub fn into_store(self) -> S {
        self.writer.into_store()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.state, RunState::Aborted | RunState::CloseFailed(_))
    }

    fn ensure_accepting(&self) -> Result<(), FilmError> {
        match self.state {
            RunState::Accepting => Ok(()),
            RunState::Configured => Err(ProtocolError::NotPrepared.into()),
            RunState::Aborted | RunState::CloseFailed(_) => Err(FilmError::Aborted),
            RunState::Closed(_) => Err(ProtocolError::Closed.into()),
        }
    }

    fn abort(&mut self, error: FilmError) -> FilmError {
        tracing::error!(%error, "aborting tiled film");
        self.state = RunState::Aborted;
        error
    }

    fn accept(&mut self, block: &ImageBlock) -> Result<(), FilmError> {
        let coord = self.validate(block)?;
        let capacity = block.sample_len();
        let mut original = self.free_list.acquire(capacity, &mut self.usage);
        let mut merged = self.free_list.acquire(capacity, &mut self.usage);
        original.reset_from(block);
        merged.reset_from(block);
        if let Err((error, slot)) = self.index.set(coord, TileSlot { original, merged }) {
            self.release(slot);
            return Err(error.into());
        }
        tracing::trace!(tile = %coord, live_buffers = self.usage.live(), "block accepted");

        let neighborhood = self.index.grid().neighborhood(coord).collect::<Vec<_>>();
        for neighbor in neighborhood {
            self.finalize_if_complete(neighbor)?;
        }
        Ok(())
    }

    fn validate(&self, block: &ImageBlock) -> Result<TileCoord, ProtocolError> {
        let grid = self.index.grid();
        let tile_size = grid.tile_size();
        let offset = block.offset();
        let size = block.size();
        let step = i64::from(tile_size);
        if i64::from(offset.x).rem_euclid(step) != 0 || i64::from(offset.y).rem_euclid(step) != 0 {
            return Err(ProtocolError::UnalignedBlock {
                offset_x: offset.x,
                offset_y: offset.y,
                tile_size,
            });
        }
        if size.x > tile_size || size.y > tile_size {
            return Err(ProtocolError::OversizedBlock {
                size_x: size.x,
                size_y: size.y,
                tile_size,
            });
        }
        let Some(coord) = grid.aligned_tile_of(offset) else {
            return Err(ProtocolError::BlockOutOfBounds {
                offset_x: offset.x,
                offset_y: offset.y,
                width: grid.size().x,
                height: grid.size().y,
            });
        };
        let expected = self.channels.as_ref().map_or(0, ChannelSet::len);
        if block.channel_count() != expected {
            return Err(ProtocolError::ChannelCountMismatch {
                tile_x: coord.x,
                tile_y: coord.y,
                expected,
                found: block.channel_count(),
            });
        }
        Ok(coord)
    }

    fn finalize_if_complete(&mut self, coord: TileCoord) -> Result<bool, StoreError> {
        if !NeighborhoodTracker::is_complete(&self.index, coord) {
            return Ok(false);
        }
        let merged_pairs = MergeEngine::merge_into(&mut self.index, coord);
        let Some(slot) = self.index.get(coord) else {
            panic!("complete tile {coord} has no slot");
        };
        self.writer.commit(coord, slot.merged.block())?;
        let Some(slot) = self.index.clear(coord) else {
            panic!("written tile {coord} vanished from the tile index");
        };
        self.release(slot);
        tracing::debug!(tile = %coord, merged_pairs, "tile flushed");
        Ok(true)
    }

    fn release(&mut self, slot: TileSlot) {
        self.free_list.release(slot.original, &mut self.usage);
        self.free_list.release(slot.merged, &mut self.usage);
    }
}

impl<S> fmt::Display for TileAccumulator<S> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = self.settings.grid.size();
        writeln!(formatter, "TiledFilm[")?;
        writeln!(formatter, "  size = {}x{},", size.x, size.y)?;
        writeln!(formatter, "  tile_size = {},", self.settings.grid.tile_size())?;
        writeln!(formatter, "  pixel_layout = {},", self.settings.pixel_layout)?;
        writeln!(
            formatter,
            "  component_encoding = {},",
            self.settings.component_encoding
        )?;
        match &self.destination {
            Some(path) => writeln!(formatter, "  destination = \"{}\"", path.display())?,
            None => writeln!(formatter, "  destination = <memory>")?,
        }
        write!(formatter, "]")
    }
}

/// Cloneable handle that serializes every accumulator call behind one mutex.
///
/// A submit holds the lock for its whole cascade, tile writes included.
#[derive(Debug)]
pub struct SharedAccumulator<S> {
    inner: Arc<Mutex<TileAccumulator<S>>>,
}

impl<S> Clone for SharedAccumulator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: TiledImageStore> SharedAccumulator<S> {
    pub fn new(accumulator: TileAccumulator<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(accumulator)),
        }
    }

    pub fn prepare<I, N>(&self, channel_names: I) -> Result<(), FilmError>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        self.lock().prepare(channel_names)
    }

    pub fn submit(&self, block: &ImageBlock) -> Result<(), FilmError> {
        self.lock().submit(block)
    }

    pub fn try_finalize(&self, coord: TileCoord) -> Result<bool, FilmError> {
        self.lock().try_finalize(coord)
    }

    pub fn shutdown(&self) -> Result<FlushSummary, FilmError> {
        self.lock().shutdown()
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().is_aborted()
    }

    /// Runs `f` with the accumulator locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut TileAccumulator<S>) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, TileAccumulator<S>> {
        self.inner
            .lock()
            .unwrap_or_else(|_| panic!("tile accumulator lock poisoned"))
    }
}
