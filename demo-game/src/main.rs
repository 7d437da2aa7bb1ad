use std::any::Any;
use std::time::Duration;

use quarry_base::{
    AttributeMap, GroupDefinition, ResourceData, ResourceError, ResourceFactory, ResourceLookup,
    ResourceResult,
};
use quarry_loader::{
    BackgroundResourceManager, GroupEventListener, ManagerState, ResourceManager,
};

/// A text blob "loaded" into memory. Stands in for anything the engine would
/// actually stream from disk.
struct TextResource {
    content: String,
    loaded: Option<String>,
}

impl ResourceData for TextResource {
    fn load(
        &mut self,
        _siblings: &dyn ResourceLookup,
    ) -> ResourceResult<()> {
        self.loaded = Some(self.content.to_uppercase());
        Ok(())
    }

    fn unload(&mut self) {
        self.loaded = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Demonstrates the sibling lookup: a caption borrows the content of the text
/// resource it names, which the dependency order guarantees is loaded first.
struct CaptionResource {
    source: String,
    caption: Option<String>,
}

impl ResourceData for CaptionResource {
    fn load(
        &mut self,
        siblings: &dyn ResourceLookup,
    ) -> ResourceResult<()> {
        let source = siblings
            .find("text", &self.source)
            .and_then(|data| data.as_any().downcast_ref::<TextResource>())
            .ok_or(ResourceError::NotFound)?;
        let content = source.loaded.as_deref().unwrap_or("");
        self.caption = Some(format!("[{}]", content));
        Ok(())
    }

    fn unload(&mut self) {
        self.caption = None;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct DemoFactory;

impl ResourceFactory for DemoFactory {
    fn create_resource(
        &self,
        type_name: &str,
        attributes: &AttributeMap,
    ) -> ResourceResult<Box<dyn ResourceData>> {
        match type_name {
            "text" => Ok(Box::new(TextResource {
                content: attributes.get("content").cloned().unwrap_or_default(),
                loaded: None,
            })),
            "caption" => Ok(Box::new(CaptionResource {
                source: attributes
                    .get("source")
                    .cloned()
                    .ok_or(ResourceError::BadParam)?,
                caption: None,
            })),
            _ => {
                log::error!("unknown resource type {}", type_name);
                Err(ResourceError::NotFound)
            }
        }
    }
}

struct PrintingListener;

impl GroupEventListener for PrintingListener {
    fn on_group_load_complete(
        &mut self,
        group: &str,
    ) {
        println!("group {} loaded", group);
    }

    fn on_group_load_error(
        &mut self,
        group: &str,
    ) {
        println!("group {} failed", group);
    }

    fn on_group_unload_complete(
        &mut self,
        group: &str,
    ) {
        println!("group {} unloaded", group);
    }

    fn on_processing_status_updated(
        &mut self,
        processed: u32,
        total: u32,
    ) {
        println!("progress {}/{}", processed, total);
    }
}

fn definitions() -> Vec<GroupDefinition> {
    // Definitions would normally come from the engine's markup parser; the
    // JSON here plays that role
    let strings = serde_json::from_str::<GroupDefinition>(
        r#"{
            "name": "strings",
            "path": "data/groups/strings.json",
            "resources": [
                { "type_name": "text",
                  "attributes": { "name": "greeting", "content": "hello quarry" } },
                { "type_name": "text",
                  "attributes": { "name": "farewell", "content": "goodbye quarry" } }
            ]
        }"#,
    )
    .unwrap();

    // The caption sources a sibling from its own group; the group's resource
    // order guarantees the text is loaded by the time the caption asks for it
    let hud = serde_json::from_str::<GroupDefinition>(
        r#"{
            "name": "hud",
            "path": "data/groups/hud.json",
            "dependencies": ["strings"],
            "resources": [
                { "type_name": "text",
                  "attributes": { "name": "hud_title", "content": "all systems go" } },
                { "type_name": "caption",
                  "attributes": { "name": "title", "source": "hud_title" } }
            ]
        }"#,
    )
    .unwrap();

    vec![strings, hud]
}

fn main() {
    // Setup logging
    env_logger::Builder::default()
        .write_style(env_logger::WriteStyle::Always)
        .filter_level(log::LevelFilter::Debug)
        .init();

    let mut manager =
        BackgroundResourceManager::new(Box::new(DemoFactory)).expect("worker thread unavailable");
    manager.add_listener(Box::new(PrintingListener));

    for def in definitions() {
        manager.create_group(&def).unwrap();
    }

    // Loading "hud" pulls "strings" in first through the dependency closure
    manager.load_group("hud").unwrap();

    // Wait for the batch to finish and for its completions to drain, so the
    // unload below cannot collide with a still-pending load batch
    let tick = Duration::from_millis(15);
    while !manager.is_group_loaded("hud") || manager.progress() != (0, 0) {
        std::thread::sleep(tick);
        manager.update(tick);
    }

    manager.unload_group("hud").unwrap();
    while manager.is_group_loaded("strings") {
        std::thread::sleep(tick);
        manager.update(tick);
    }

    manager.shutdown();
    while manager.state() != ManagerState::Closed {
        std::thread::sleep(tick);
        manager.update(tick);
    }
    println!("done");
}
