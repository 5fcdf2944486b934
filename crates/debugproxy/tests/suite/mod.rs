mod listener;
mod proxy_relay;
