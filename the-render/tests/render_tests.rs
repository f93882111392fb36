use std::sync::Arc;

use the_bridge::CallbackRegistry;
use the_render::{
  DiffRenderer,
  VNode,
  render_vnode,
};
use the_router::{
  BufferManagerApi,
  BufferQuery,
  BufferRouter,
};
use the_test::FakeBufferManager;

fn todo_list(items: &[&str]) -> VNode {
  items.iter().fold(
    VNode::element("div").child(VNode::element("heading").child("Todo".into())),
    |list, item| list.child(VNode::element("li").child((*item).into())),
  )
}

#[tokio::test]
async fn renders_through_router_touching_only_changed_lines() {
  let peer = Arc::new(FakeBufferManager::new());
  let router = Arc::new(BufferRouter::new(
    peer.clone(),
    Arc::new(CallbackRegistry::new()),
    BufferManagerApi::default(),
  ));
  let renderer = DiffRenderer::new(router.clone());
  let id = router
    .create_buffer("/todo", BufferQuery::new())
    .await
    .unwrap()
    .unwrap();

  assert!(renderer.render(&id, &todo_list(&["milk", "eggs"])).await.unwrap());
  assert_eq!(peer.lines(&id), vec!["# Todo", "- milk", "- eggs"]);

  assert!(renderer.render(&id, &todo_list(&["milk", "eggs"])).await.unwrap());
  assert_eq!(peer.calls_to("update_buffer_content"), 1);

  assert!(renderer.render(&id, &todo_list(&["milk"])).await.unwrap());
  assert_eq!(peer.lines(&id), vec!["# Todo", "- milk"]);
  assert_eq!(renderer.cached_lines(&id), Some(render_vnode(&todo_list(&["milk"]))));

  let last = peer.calls().pop().unwrap();
  assert_eq!(last.function, "update_buffer_content");
  assert_eq!(last.args[1], serde_json::json!([false, false, { "delete": true }]));
}

#[tokio::test]
async fn rejected_update_is_retried_on_next_render() {
  let peer = Arc::new(FakeBufferManager::new());
  let router = Arc::new(BufferRouter::new(
    peer.clone(),
    Arc::new(CallbackRegistry::new()),
    BufferManagerApi::default(),
  ));
  let renderer = DiffRenderer::new(router.clone());
  let id = router
    .create_buffer("/todo", BufferQuery::new())
    .await
    .unwrap()
    .unwrap();

  peer.fail("update_buffer_content");
  assert!(!renderer.render(&id, &todo_list(&["milk"])).await.unwrap());
  assert_eq!(renderer.cached_lines(&id), None);

  peer.heal();
  assert!(renderer.render(&id, &todo_list(&["milk"])).await.unwrap());
  assert_eq!(peer.lines(&id), vec!["# Todo", "- milk"]);
}

#[tokio::test]
async fn disposed_router_surfaces_as_error() {
  let peer = Arc::new(FakeBufferManager::new());
  let router = Arc::new(BufferRouter::new(
    peer,
    Arc::new(CallbackRegistry::new()),
    BufferManagerApi::default(),
  ));
  let renderer = DiffRenderer::new(router.clone());
  router.dispose();

  assert!(renderer.apply_diff("B1", vec!["x".into()]).await.is_err());
}
