use pretty_assertions::assert_eq;
use std::sync::Arc;
use storyline_runtime::{
    ModuleRequest, RuntimeConfig, Shell, StoryId, StoryRegistry, StoryState,
};
use storyline_storage::{Intent, MemoryStore, ModulePath};
use storyline_test_utils::{fast_config, FakeHost, FakeLauncher, FakeShell};

fn registry(launcher: Arc<FakeLauncher>, config: RuntimeConfig) -> StoryRegistry {
    StoryRegistry::new(
        launcher,
        FakeHost::new(),
        Arc::new(|_: &StoryId| -> Arc<dyn Shell> { FakeShell::new() }),
        config,
    )
}

#[tokio::test]
async fn test_create_story_reuses_existing_controller() {
    let registry = registry(FakeLauncher::new(), fast_config());
    let id = StoryId::new();

    let first = registry.create_story(id, Arc::new(MemoryStore::new()));
    let again = registry.create_story(id, Arc::new(MemoryStore::new()));

    assert_eq!(first.story_id(), again.story_id());
    assert_eq!(first.storage().label(), again.storage().label());
    assert_eq!(registry.len(), 1);
    assert!(registry.get(&id).is_some());
    assert!(registry.get(&StoryId::new()).is_none());
}

#[tokio::test]
async fn test_story_ids_are_sorted() {
    let registry = registry(FakeLauncher::new(), fast_config());
    let ids: Vec<StoryId> = (0..3).map(|_| StoryId::new()).collect();
    for id in ids.iter().rev() {
        registry.create_story(*id, Arc::new(MemoryStore::new()));
    }

    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(registry.story_ids(), expected);
}

#[tokio::test]
async fn test_delete_story_stops_and_forgets() {
    let launcher = FakeLauncher::new();
    let registry = registry(launcher.clone(), fast_config());
    let id = StoryId::new();
    let story = registry.create_story(id, Arc::new(MemoryStore::new()));

    story.request_start().await.unwrap();
    story
        .add_module(ModuleRequest::new(ModulePath::root(), "a", Intent::new("app://a")))
        .await
        .unwrap();
    let process = launcher.process(&ModulePath::single("a")).unwrap();

    assert!(registry.delete_story(&id).await);
    assert_eq!(story.state(), StoryState::Stopped);
    assert_eq!(process.terminations(), 1);
    assert!(registry.is_empty());
    assert!(!registry.delete_story(&id).await);
}

#[tokio::test]
async fn test_stop_all_keeps_stories_registered() {
    let registry = registry(FakeLauncher::new(), fast_config());
    let stories: Vec<_> = (0..2)
        .map(|_| registry.create_story(StoryId::new(), Arc::new(MemoryStore::new())))
        .collect();
    for story in &stories {
        story.request_start().await.unwrap();
    }

    registry.stop_all().await;

    assert!(stories.iter().all(|story| story.state() == StoryState::Stopped));
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_stories_share_launcher_but_not_storage() {
    let launcher = FakeLauncher::new();
    let registry = registry(launcher.clone(), fast_config());
    let one = registry.create_story(StoryId::new(), Arc::new(MemoryStore::new()));
    let two = registry.create_story(StoryId::new(), Arc::new(MemoryStore::new()));

    one.request_start().await.unwrap();
    two.request_start().await.unwrap();
    one.add_module(ModuleRequest::new(ModulePath::root(), "a", Intent::new("app://a")))
        .await
        .unwrap();

    assert_eq!(launcher.launch_count(), 1);
    assert_eq!(one.running_module_paths().len(), 1);
    assert!(two.running_module_paths().is_empty());
    assert!(two.storage().read_all_module_records().await.unwrap().is_empty());
}
