//! Simulcast layer tracking and selection for the projected video source

use crate::source::SourceRegistry;
use rtskit_core::{LayerDescriptor, MediaKind, RtsError, RtsResult, SubscriberTransport};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Reduce raw layer reports to one selectable layer per quality tier.
///
/// Simulcast layers (non-empty encoding id) are grouped by encoding id,
/// keeping the layer at its highest temporal layer. Without encoding ids,
/// scalable layers are grouped by spatial layer, keeping the one at the
/// highest spatial layer. Layers are then ordered high, medium, low.
pub fn filter_active_layers(layers: &[LayerDescriptor]) -> Vec<LayerDescriptor> {
    let simulcast: Vec<&LayerDescriptor> = layers
        .iter()
        .filter(|layer| !layer.encoding_id.is_empty())
        .collect();

    let mut filtered = if simulcast.is_empty() {
        let scalable: Vec<&LayerDescriptor> = layers
            .iter()
            .filter(|layer| layer.spatial_layer_id.is_some())
            .collect();
        best_per_group(&scalable, |layer| layer.spatial_layer_id, |layer| {
            layer.spatial_layer_id == layer.max_spatial_layer_id
        })
    } else {
        best_per_group(&simulcast, |layer| layer.encoding_id.clone(), |layer| {
            layer.temporal_layer_id == layer.max_temporal_layer_id
        })
    };

    filtered.sort_by_key(|layer| quality_rank(&layer.encoding_id));
    filtered
}

fn best_per_group<K: PartialEq>(
    layers: &[&LayerDescriptor],
    key: impl Fn(&LayerDescriptor) -> K,
    is_best: impl Fn(&LayerDescriptor) -> bool,
) -> Vec<LayerDescriptor> {
    let mut groups: Vec<(K, Vec<&LayerDescriptor>)> = Vec::new();
    for &layer in layers {
        let group_key = key(layer);
        match groups.iter_mut().find(|(k, _)| *k == group_key) {
            Some((_, members)) => members.push(layer),
            None => groups.push((group_key, vec![layer])),
        }
    }
    groups
        .into_iter()
        .filter_map(|(_, members)| {
            members
                .iter()
                .find(|layer| is_best(layer))
                .or_else(|| members.last())
                .map(|layer| (*layer).clone())
        })
        .collect()
}

fn quality_rank(encoding_id: &str) -> u8 {
    match encoding_id.to_ascii_lowercase().as_str() {
        "h" => 0,
        "m" => 1,
        "l" => 2,
        _ => 3,
    }
}

/// Selectable layer ids of the projected video source.
///
/// `""` (automatic) comes first; empty when no video source is projected.
pub fn active_layer_ids(registry: &SourceRegistry) -> Vec<String> {
    match registry.projected_source(MediaKind::Video) {
        Some(source) => std::iter::once(String::new())
            .chain(source.active_layers.iter().map(LayerDescriptor::id))
            .collect(),
        None => Vec::new(),
    }
}

/// Latest layer report per media id, applied to the projected video source
#[derive(Debug, Default)]
pub struct LayerSelector {
    reports: HashMap<String, Vec<LayerDescriptor>>,
    last_mid: Option<String>,
}

impl LayerSelector {
    /// Selector without any report
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter and remember a layer report. Returns the selectable layers.
    pub fn record(
        &mut self,
        mid: &str,
        active: &[LayerDescriptor],
        inactive: &[String],
    ) -> Vec<LayerDescriptor> {
        let filtered = filter_active_layers(active);
        debug!(
            "📶 Layers for mid {}: {} active, {} selectable, {} inactive",
            mid,
            active.len(),
            filtered.len(),
            inactive.len()
        );
        self.reports.insert(mid.to_string(), filtered.clone());
        self.last_mid = Some(mid.to_string());
        filtered
    }

    /// Selectable layers last reported for a media id
    pub fn layers_for(&self, mid: &str) -> &[LayerDescriptor] {
        self.reports.get(mid).map(Vec::as_slice).unwrap_or_default()
    }

    /// Copy the report for the video playout mid onto the projected video source.
    ///
    /// Falls back to the most recent report when the mid is not known yet.
    /// Returns the projected source id when layers were applied.
    pub fn refresh(&self, registry: &mut SourceRegistry, video_mid: Option<&str>) -> Option<String> {
        let source_id = registry.projected(MediaKind::Video)?.to_string();
        let mid = video_mid.or(self.last_mid.as_deref());
        let layers = mid.map(|mid| self.layers_for(mid).to_vec()).unwrap_or_default();
        registry.set_layers(&source_id, layers).ok()?;
        Some(source_id)
    }

    /// Pin a layer of the projected video source; `""` selects automatically.
    ///
    /// Returns `Ok(false)` when the layer is already active. The pinned id is
    /// only updated once the transport accepted the selection.
    pub fn select_layer(
        &self,
        registry: &mut SourceRegistry,
        transport: &mut dyn SubscriberTransport,
        layer_id: &str,
    ) -> RtsResult<bool> {
        let source = registry
            .projected_source_mut(MediaKind::Video)
            .ok_or_else(|| RtsError::precondition("select layer", "no video source is projected"))?;
        if source.active_layer_id == layer_id {
            debug!("Layer {:?} already active", layer_id);
            return Ok(false);
        }

        let layer = if layer_id.is_empty() {
            None
        } else {
            let layer = source
                .layer(layer_id)
                .cloned()
                .ok_or_else(|| RtsError::LayerNotFound {
                    layer_id: layer_id.to_string(),
                })?;
            Some(layer)
        };

        if !transport.select(layer.as_ref()) {
            warn!("❌ Transport rejected layer {:?}", layer_id);
            return Err(RtsError::transport(
                "select layer",
                format!("layer {layer_id:?} was not accepted"),
            ));
        }
        source.active_layer_id = layer_id.to_string();
        info!(
            "📶 Layer of {:?} set to {}",
            source.source_id,
            if layer_id.is_empty() { "automatic" } else { layer_id }
        );
        Ok(true)
    }

    /// Forget every report
    pub fn clear(&mut self) {
        self.reports.clear();
        self.last_mid = None;
    }
}
