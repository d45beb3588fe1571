/*
[INPUT]:  Widget placement commands, layout file on disk
[OUTPUT]: Validated widget layout and its versioned JSON persistence
[POS]:    Layout layer - widget grid state
[UPDATE]: When adding widget kinds or bumping the layout version
*/

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use coinpulse_adapter::ContractAddress;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

pub const MAX_WIDGETS: usize = 20;
pub const LAYOUT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WidgetKind {
    LivePrice,
    TradeFeed,
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LivePrice => write!(f, "LIVE_PRICE"),
            Self::TradeFeed => write!(f, "TRADE_FEED"),
        }
    }
}

/// Grid cell of a widget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: Uuid,
    pub kind: WidgetKind,
    pub contract_address: ContractAddress,
    pub position: Position,
    #[serde(default)]
    pub settings: WidgetSettings,
}

/// On-disk form of the layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    pub version: u32,
    pub widgets: Vec<Widget>,
}

/// Ordered widget collection with unique ids, at most `MAX_WIDGETS`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetLayout {
    widgets: Vec<Widget>,
}

impl WidgetLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored widgets, skipping duplicate ids and overflow
    pub fn from_widgets(widgets: Vec<Widget>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(widgets.len().min(MAX_WIDGETS));
        for widget in widgets {
            if !seen.insert(widget.id) {
                warn!(id = %widget.id, "duplicate widget id skipped");
                continue;
            }
            if kept.len() == MAX_WIDGETS {
                warn!(id = %widget.id, limit = MAX_WIDGETS, "widget limit reached; skipped");
                continue;
            }
            kept.push(widget);
        }
        Self { widgets: kept }
    }

    pub fn add(
        &mut self,
        kind: WidgetKind,
        contract_address: ContractAddress,
        position: Position,
    ) -> Result<Widget> {
        if self.widgets.len() >= MAX_WIDGETS {
            return Err(anyhow!("Widget limit of {} reached", MAX_WIDGETS));
        }

        let mut id = Uuid::new_v4();
        while self.get(id).is_some() {
            id = Uuid::new_v4();
        }

        let widget = Widget {
            id,
            kind,
            contract_address,
            position,
            settings: WidgetSettings::default(),
        };
        self.widgets.push(widget.clone());
        Ok(widget)
    }

    pub fn move_widget(&mut self, id: Uuid, position: Position) -> Result<()> {
        let widget = self
            .widgets
            .iter_mut()
            .find(|widget| widget.id == id)
            .ok_or_else(|| anyhow!("Widget '{}' not found", id))?;
        widget.position = position;
        Ok(())
    }

    pub fn remove(&mut self, id: Uuid) -> Result<Widget> {
        let index = self
            .widgets
            .iter()
            .position(|widget| widget.id == id)
            .ok_or_else(|| anyhow!("Widget '{}' not found", id))?;
        Ok(self.widgets.remove(index))
    }

    pub fn get(&self, id: Uuid) -> Option<&Widget> {
        self.widgets.iter().find(|widget| widget.id == id)
    }

    pub fn widgets(&self) -> &[Widget] {
        &self.widgets
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    pub fn snapshot(&self) -> LayoutSnapshot {
        LayoutSnapshot {
            version: LAYOUT_VERSION,
            widgets: self.widgets.clone(),
        }
    }
}

/// JSON file holding the layout snapshot
#[derive(Debug, Clone)]
pub struct LayoutStorage {
    path: PathBuf,
}

impl LayoutStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored layout; missing, unreadable or unknown-version files yield an
    /// empty layout
    pub async fn load(&self) -> WidgetLayout {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved layout");
                return WidgetLayout::new();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read layout");
                return WidgetLayout::new();
            }
        };

        let snapshot: LayoutSnapshot = match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "saved layout is not valid; starting empty");
                return WidgetLayout::new();
            }
        };
        if snapshot.version != LAYOUT_VERSION {
            warn!(
                path = %self.path.display(),
                version = snapshot.version,
                expected = LAYOUT_VERSION,
                "unsupported layout version; starting empty"
            );
            return WidgetLayout::new();
        }

        let layout = WidgetLayout::from_widgets(snapshot.widgets);
        info!(path = %self.path.display(), widgets = layout.len(), "layout restored");
        layout
    }

    pub async fn save(&self, layout: &WidgetLayout) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create layout dir {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&layout.snapshot())?;

        // Atomic write: write to temp file then rename
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, content)
            .await
            .with_context(|| format!("write layout {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("replace layout {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    fn bonk() -> ContractAddress {
        ContractAddress::new(BONK).unwrap()
    }

    #[test]
    fn add_enforces_limit_and_unique_ids() {
        let mut layout = WidgetLayout::new();
        for i in 0..MAX_WIDGETS {
            layout
                .add(WidgetKind::LivePrice, bonk(), Position { x: i as i32, y: 0 })
                .unwrap();
        }
        let ids: HashSet<Uuid> = layout.widgets().iter().map(|w| w.id).collect();
        assert_eq!(ids.len(), MAX_WIDGETS);

        let err = layout
            .add(WidgetKind::TradeFeed, bonk(), Position::default())
            .unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn move_and_remove_by_id() {
        let mut layout = WidgetLayout::new();
        let widget = layout
            .add(WidgetKind::TradeFeed, bonk(), Position::default())
            .unwrap();

        layout.move_widget(widget.id, Position { x: 3, y: 4 }).unwrap();
        assert_eq!(layout.get(widget.id).unwrap().position, Position { x: 3, y: 4 });

        let removed = layout.remove(widget.id).unwrap();
        assert_eq!(removed.id, widget.id);
        assert!(layout.is_empty());
        assert!(layout.remove(widget.id).is_err());
        assert!(layout.move_widget(widget.id, Position::default()).is_err());
    }

    #[test]
    fn from_widgets_drops_duplicates() {
        let mut layout = WidgetLayout::new();
        let widget = layout
            .add(WidgetKind::LivePrice, bonk(), Position::default())
            .unwrap();
        let restored = WidgetLayout::from_widgets(vec![widget.clone(), widget]);
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn widget_json_uses_wire_names() {
        let mut layout = WidgetLayout::new();
        layout
            .add(WidgetKind::TradeFeed, bonk(), Position { x: 1, y: 2 })
            .unwrap();
        let json = serde_json::to_value(layout.snapshot()).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["widgets"][0]["kind"], "TRADE_FEED");
        assert_eq!(json["widgets"][0]["contractAddress"], BONK);
        assert_eq!(json["widgets"][0]["position"]["y"], 2);
    }
}
