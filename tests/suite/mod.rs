mod combine;
mod explore;
mod save;
