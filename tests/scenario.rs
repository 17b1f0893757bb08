use std::{sync::Arc, time::Duration};

use serde_json::json;

use secrettrails::{
    Session,
    auth::LocalAuth,
    backend::{Fields, SqliteBackend},
    board::{NewToken, TokenImage},
    campaigns::join_code,
    db::{MessageKind, Role},
    sync::LiveState,
};

async fn settle<S, F>(state: &LiveState<S>, pred: F) -> S
where
    S: Clone + Default,
    F: FnMut(&S) -> bool,
{
    let mut rx = state.watch();
    let value = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for live state")
        .expect("live state dropped");
    value.clone()
}

async fn drained(db: &SqliteBackend) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while db.active_listeners() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listeners still open");
}

fn fields(value: serde_json::Value) -> Fields {
    value.as_object().cloned().unwrap()
}

fn assert_signed_out(session: &Session) {
    assert!(!session.auth.is_authenticated());
    assert!(session.profiles.profile().is_none());
    assert!(session.campaigns.my_campaigns().is_empty());
    assert!(session.campaigns.joined_campaigns().is_empty());
    assert!(session.characters.characters().is_empty());
    assert!(session.chat.messages().is_empty());
    assert!(session.drawings.drawings().is_empty());
    assert!(session.drawings.texts().is_empty());
    assert!(session.tokens.tokens().is_empty());
}

fn client(db: &Arc<SqliteBackend>) -> Session {
    let session = Session::new(db.clone(), Arc::new(LocalAuth::new()));
    session.auth.init_auth_listener();
    session
}

#[tokio::test]
async fn gm_creates_and_player_joins() {
    let db = Arc::new(SqliteBackend::in_memory().await.unwrap());

    let gm = client(&db);
    let user = gm.auth.register("gm@test.io", "hunter22").await.unwrap();
    assert_eq!(gm.profiles.role(), Some(Role::Player));
    assert!(gm.campaigns.create_campaign(&gm.actor().unwrap(), "Ruins of X").await.is_err());

    gm.profiles.set_role(&user.uid, "gm").await.unwrap();
    let campaign = gm
        .campaigns
        .create_campaign(&gm.actor().unwrap(), "Ruins of X")
        .await
        .unwrap();
    assert_eq!(campaign.join_code.len(), join_code::LEN);
    assert!(
        campaign
            .join_code
            .bytes()
            .all(|b| join_code::ALPHABET.contains(&b))
    );

    let player = client(&db);
    let player_user = player.auth.register("pc@test.io", "hunter22").await.unwrap();
    let joined = player
        .campaigns
        .join_campaign(&player.actor().unwrap(), &campaign.join_code.to_lowercase())
        .await
        .unwrap();
    assert_eq!(joined.id, campaign.id);
    assert!(joined.players.contains(&player_user.uid));

    gm.campaigns.subscribe_to_all_campaigns(&user.uid).await.unwrap();
    player.campaigns.subscribe_to_all_campaigns(&player_user.uid).await.unwrap();

    let mine = settle(gm.campaigns.live_master(), |c| c.len() == 1).await;
    assert_eq!(mine[0].id, campaign.id);
    let theirs = settle(player.campaigns.live_player(), |c| c.len() == 1).await;
    assert_eq!(theirs[0].id, campaign.id);
    assert!(gm.campaigns.joined_campaigns().is_empty());
    assert!(player.campaigns.my_campaigns().is_empty());

    gm.chat.subscribe_to_chat(&campaign.id).await.unwrap();
    player
        .chat
        .send_message(&player.actor().unwrap(), &campaign.id, "hello", MessageKind::Message)
        .await
        .unwrap();
    let log = settle(gm.chat.live(), |m| m.len() == 1).await;
    assert_eq!(log[0].user_name, "pc");
    assert_eq!(log[0].user_role, Some(Role::Player));

    let id = campaign.id.as_str();
    player
        .characters
        .create_character(id, &player_user.uid, fields(json!({ "name": "Borin", "race": "gmur" })))
        .await
        .unwrap();
    gm.drawings
        .save_drawing(&user.uid, id, fields(json!({ "points": [0, 0, 40, 40] })))
        .await
        .unwrap();
    gm.drawings
        .save_text(&user.uid, id, fields(json!({ "text": "Gate", "x": 10, "y": 10 })))
        .await
        .unwrap();
    gm.tokens
        .create_token(&user.uid, id, NewToken::new("Goblin", TokenImage::Emoji("👺".to_owned())))
        .await
        .unwrap();

    for session in [&gm, &player] {
        session.characters.subscribe_to_characters(id).await.unwrap();
        session.drawings.subscribe_to_drawings(id).await.unwrap();
        session.tokens.subscribe_to_tokens(id).await.unwrap();
        settle(session.characters.live(), |c| c.len() == 1).await;
        settle(session.drawings.live_drawings(), |d| d.len() == 1).await;
        settle(session.drawings.live_texts(), |t| t.len() == 1).await;
        settle(session.tokens.live(), |t| t.len() == 1).await;
    }
    player.chat.subscribe_to_chat(id).await.unwrap();
    settle(player.chat.live(), |m| m.len() == 1).await;
    assert_eq!(player.characters.get_my_characters(&player_user.uid).len(), 1);

    gm.logout().await.unwrap();
    assert_signed_out(&gm);
    // the other client is unaffected
    assert_eq!(player.tokens.tokens().len(), 1);

    player.logout().await.unwrap();
    assert_signed_out(&player);
    drained(&db).await;
}
