use std::collections::HashSet;

use smol_str::SmolStr;

use crate::{ConfigurationError, PixelLayout};

/// Ordered, duplicate-free channel names fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    names: Vec<SmolStr>,
}

impl ChannelSet {
    pub fn new<I, S>(names: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = names
            .into_iter()
            .map(|name| SmolStr::new(name.as_ref()))
            .collect::<Vec<_>>();
        if names.is_empty() {
            return Err(ConfigurationError::EmptyChannelList);
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ConfigurationError::DuplicateChannel {
                    name: name.to_string(),
                });
            }
        }
        Ok(Self { names })
    }

    /// Builds the channel set for `layout` from `names`, checking that a named layout gets
    /// exactly as many channels as it carries.
    pub fn for_layout<I, S>(layout: PixelLayout, names: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let channels = Self::new(names)?;
        if let Some(expected) = layout.channel_count()
            && expected != channels.len()
        {
            return Err(ConfigurationError::LayoutChannelCount {
                layout: layout.name(),
                expected,
                found: channels.len(),
            });
        }
        Ok(channels)
    }

    /// The canonical names of a named layout; `None` for multi-channel output.
    pub fn canonical(layout: PixelLayout) -> Option<Self> {
        let names = layout.channel_names();
        (!names.is_empty()).then(|| Self {
            names: names.iter().copied().map(SmolStr::new_static).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[SmolStr] {
        &self.names
    }
}
