use tesla_stream::{
    api::Client,
    ws::{ConnectionState, StreamClient},
};

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let token = std::env::var("TESLA_ACCESS_TOKEN")
        .map_err(|_| {
            println!("No TESLA_ACCESS_TOKEN env var or invalid");
            std::process::exit(1);
        })
        .unwrap();

    let mut api = Client::new_from_oauth2_token(&token).unwrap();
    if let Ok(vin) = std::env::var("TESLA_VIN") {
        api = api.with_vin(vin);
    }

    let mut builder = StreamClient::builder()
        .on_stream_data(|values| println!("data: {}", values.join(",")))
        .on_inactive(|| println!("stream inactive"))
        .on_too_many_disconnects(|| println!("vehicle keeps disconnecting"))
        .on_offline(|| println!("vehicle offline"))
        .on_error(|err| println!("stream error: {}", err));

    if let Ok(endpoint) = std::env::var("TESLA_STREAM_ENDPOINT") {
        builder = builder.endpoint(endpoint.parse().unwrap());
    }

    let client = builder.build();

    client.connect_with(&api, |request| request).await.unwrap();

    tokio::signal::ctrl_c().await.unwrap();

    client.close().unwrap();
    let state = client
        .wait_state(|s| s == ConnectionState::Closed)
        .await
        .unwrap();
    println!("stream {:?}", state);
}
