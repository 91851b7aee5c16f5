use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;
use upnflow::{
    CloseOutcome, Database, DatabaseConfig, FlowEditor, FlowError, FlowStore, FlowTemplate,
    FlowUpdate, Handle, NodeKind, NodePatch, Point, Side, SqliteFlowStore, connect, delete_flow,
    duplicate_flow,
};

async fn sqlite_store() -> Result<(TempDir, Arc<SqliteFlowStore>)> {
    let dir = TempDir::new()?;
    let db = Database::new(DatabaseConfig::at(dir.path().join("flows.db"))).await?;
    Ok((dir, Arc::new(SqliteFlowStore::new(db))))
}

#[tokio::test]
async fn edit_save_and_reopen_a_flow() -> Result<()> {
    let (_dir, store) = sqlite_store().await?;
    let mut editor = FlowEditor::new(Arc::clone(&store));

    editor.new_root("A", FlowTemplate::Empty)?;
    let view = editor.active_mut().expect("root view");
    let review = view.graph_mut().add_node(NodeKind::Activity, Point::new(0.0, 0.0));
    view.graph_mut()
        .update_node_data(&review, NodePatch::verb_phrase("Review"))?;
    let assigned = view
        .graph()
        .node(&review)
        .and_then(|node| node.activity())
        .and_then(|activity| activity.node_number);
    assert_eq!(assigned, Some(1));
    let end = view.graph_mut().add_node(NodeKind::End, Point::new(300.0, 0.0));
    let edge = connect(
        view.graph_mut(),
        &review,
        Handle::new(Side::Right, 1),
        &end,
        Handle::new(Side::Left, 1),
    )
    .expect("edge between two handled nodes");
    assert!(view.is_dirty());

    let saved = editor.save_active().await?;
    assert!(!editor.active().expect("root view").is_dirty());
    assert_eq!(editor.request_close()?, CloseOutcome::Closed);

    let mut reopened = FlowEditor::new(Arc::clone(&store));
    reopened.open_root(&saved.id).await?;
    let graph = reopened.active().expect("reopened view").graph();
    let node = graph.node(&review).expect("activity persisted");
    let activity = node.activity().expect("activity data");
    assert_eq!(activity.verb_phrase, "Review");
    assert_eq!(activity.node_number, Some(1));
    assert_eq!(graph.edge(&edge).map(|e| e.label.as_str()), Some("New Edge"));
    Ok(())
}

#[tokio::test]
async fn duplicate_and_delete_a_drilldown_tree() -> Result<()> {
    let (_dir, store) = sqlite_store().await?;
    let mut editor = FlowEditor::new(Arc::clone(&store));

    editor.new_root("Root", FlowTemplate::Basic)?;
    let activity = editor.active().expect("root view").graph().nodes()[1].id.clone();
    let root = editor.save_active().await?;
    let child_id = editor.create_drilldown(&activity).await?;

    let child_node = editor
        .active_mut()
        .expect("child view")
        .graph_mut()
        .add_node(NodeKind::Activity, Point::default());
    editor.save_active().await?;
    let grandchild_id = editor.create_drilldown(&child_node).await?;
    editor.save_active().await?;
    editor.request_close()?;
    editor.save_active().await?;
    editor.request_close()?;
    editor.save_active().await?;
    assert_eq!(editor.request_close()?, CloseOutcome::Closed);

    let copy = duplicate_flow(store.as_ref(), &root.id, "Root copy").await?;
    assert_eq!(copy.name, "Root copy");
    assert_eq!(copy.parent_flow_id, None);
    assert_eq!(store.list_all().await?.len(), 6);

    let copied_child = copy
        .flow_data
        .drilldown_ids()
        .next()
        .expect("copy links a child")
        .to_string();
    assert_ne!(copied_child, child_id);

    let deleted = delete_flow(store.as_ref(), &root.id).await?;
    assert_eq!(deleted, vec![grandchild_id, child_id, root.id.clone()]);
    assert!(matches!(
        store.fetch(&root.id).await,
        Err(FlowError::NotFound(_))
    ));

    let copied = store.fetch(&copied_child).await?;
    assert_eq!(copied.parent_flow_id.as_deref(), Some(copy.id.as_str()));
    assert_eq!(store.list_roots().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn renaming_through_the_store_keeps_the_graph() -> Result<()> {
    let (_dir, store) = sqlite_store().await?;
    let mut editor = FlowEditor::new(Arc::clone(&store));
    editor.new_root("Draft", FlowTemplate::Basic)?;
    let saved = editor.save_active().await?;

    let renamed = store
        .update(
            &saved.id,
            FlowUpdate {
                name: Some("Final".to_string()),
                ..FlowUpdate::default()
            },
        )
        .await?;
    assert_eq!(renamed.name, "Final");
    assert_eq!(renamed.flow_data, saved.flow_data);
    Ok(())
}
